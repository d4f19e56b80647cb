//! Drives the telnet client against an in-process IOS-like device.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ssh_enabler::config::SessionSettings;
use ssh_enabler::credentials::Credentials;
use ssh_enabler::error::{ConnectError, FailureKind};
use ssh_enabler::failure_log::MemorySink;
use ssh_enabler::inventory::DeviceTarget;
use ssh_enabler::posture::{KEY_GENERATION, POSTURE_QUERY, SAVE_CONFIG};
use ssh_enabler::remediator::{OutcomeStatus, RemediationOptions, Remediator};
use ssh_enabler::session::{Connector, DeviceSession, TelnetConnector};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const IAC: u8 = 255;
const WILL: u8 = 251;
const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;

const HOSTNAME: &str = "router1";
const USERNAME: &str = "netops";
const SECRET: &str = "Sup3r-S3cret!";

#[derive(Clone, Copy, PartialEq, Eq)]
enum CliMode {
    User,
    Privileged,
    Config,
    ConfigLine,
}

#[derive(Clone)]
struct FakeIos {
    posture: &'static str,
    accept_secret: &'static str,
    enable_secret: &'static str,
    /// Line password only: no username question, password asked again on failure.
    line_password: bool,
    keygen_reply: &'static str,
    received: Arc<Mutex<Vec<String>>>,
}

impl FakeIos {
    fn new(posture: &'static str) -> Self {
        Self {
            posture,
            accept_secret: SECRET,
            enable_secret: SECRET,
            line_password: false,
            keygen_reply: "The name for the keys will be: router1.lab.local\n\
                           % The key modulus size is 2048 bits\n\
                           % Generating 2048 bit RSA keys, keys will be non-exportable...\n\
                           [OK] (elapsed time was 1 seconds)",
            received: Arc::default(),
        }
    }

    fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    async fn listen(self) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let device = self.clone();
                tokio::spawn(async move {
                    let _ = device.serve(stream).await;
                });
            }
        });
        port
    }

    async fn serve(&self, mut stream: TcpStream) -> std::io::Result<()> {
        stream
            .write_all(&[IAC, WILL, OPT_ECHO, IAC, WILL, OPT_SGA])
            .await?;
        stream
            .write_all(b"\r\n\r\nUser Access Verification\r\n\r\n")
            .await?;
        if self.line_password {
            loop {
                stream.write_all(b"Password: ").await?;
                if read_line(&mut stream).await? == self.accept_secret {
                    break;
                }
                stream.write_all(b"\r\n").await?;
            }
            return self.cli(stream).await;
        }
        stream.write_all(b"Username: ").await?;
        let username = read_line(&mut stream).await?;
        stream.write_all(format!("{username}\r\nPassword: ").as_bytes()).await?;
        let password = read_line(&mut stream).await?;
        if username != USERNAME || password != self.accept_secret {
            stream
                .write_all(b"\r\n% Login invalid\r\n\r\nUsername: ")
                .await?;
            let _ = read_line(&mut stream).await;
            return Ok(());
        }
        self.cli(stream).await
    }

    async fn cli(&self, mut stream: TcpStream) -> std::io::Result<()> {
        let mut mode = CliMode::User;
        stream.write_all(prompt(mode).as_bytes()).await?;
        loop {
            let command = read_line(&mut stream).await?;
            self.received.lock().unwrap().push(command.clone());
            stream.write_all(format!("{command}\r\n").as_bytes()).await?;

            let reply = match (mode, command.as_str()) {
                (_, "exit") if mode == CliMode::User || mode == CliMode::Privileged => {
                    return Ok(());
                }
                (CliMode::User, "enable") => {
                    stream.write_all(b"Password: ").await?;
                    let secret = read_line(&mut stream).await?;
                    if secret == self.enable_secret {
                        mode = CliMode::Privileged;
                        "\r\n".to_string()
                    } else {
                        "\r\n% Access denied\r\n\r\n".to_string()
                    }
                }
                (CliMode::Privileged, "terminal length 0") => String::new(),
                (CliMode::Privileged, "configure terminal") => {
                    mode = CliMode::Config;
                    "Enter configuration commands, one per line.  End with CNTL/Z.\r\n".to_string()
                }
                (CliMode::Privileged, POSTURE_QUERY) => lines(self.posture),
                (CliMode::Privileged, "show run | section include line vty") => {
                    lines("line vty 0 4\n login local\n transport input telnet ssh")
                }
                (CliMode::Privileged, SAVE_CONFIG) => {
                    "Building configuration...\r\n[OK]\r\n".to_string()
                }
                (CliMode::Config | CliMode::ConfigLine, "end") => {
                    mode = CliMode::Privileged;
                    String::new()
                }
                (CliMode::Config, KEY_GENERATION) => lines(self.keygen_reply),
                (CliMode::Config, "ip ssh version 2") => String::new(),
                (CliMode::Config | CliMode::ConfigLine, "line vty 0 15") => {
                    mode = CliMode::ConfigLine;
                    String::new()
                }
                (CliMode::ConfigLine, "transport input telnet ssh") => String::new(),
                _ => "                ^\r\n% Invalid input detected at '^' marker.\r\n\r\n"
                    .to_string(),
            };
            stream.write_all(reply.as_bytes()).await?;
            stream.write_all(prompt(mode).as_bytes()).await?;
        }
    }
}

fn prompt(mode: CliMode) -> String {
    match mode {
        CliMode::User => format!("{HOSTNAME}>"),
        CliMode::Privileged => format!("{HOSTNAME}#"),
        CliMode::Config => format!("{HOSTNAME}(config)#"),
        CliMode::ConfigLine => format!("{HOSTNAME}(config-line)#"),
    }
}

fn lines(text: &str) -> String {
    text.lines().map(|line| format!("{line}\r\n")).collect()
}

/// Reads one CR LF terminated line, skipping telnet option replies.
async fn read_line(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if stream.read(&mut byte).await? == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        match byte[0] {
            IAC => {
                let mut option = [0u8; 2];
                stream.read_exact(&mut option).await?;
            }
            b'\n' => break,
            b'\r' => {}
            other => line.push(other),
        }
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

fn settings(port: u16) -> SessionSettings {
    SessionSettings {
        telnet_port: port,
        connect_timeout: Duration::from_secs(5),
        command_timeout: Duration::from_secs(5),
        keygen_timeout: Duration::from_secs(10),
        ..SessionSettings::default()
    }
}

fn target() -> DeviceTarget {
    DeviceTarget::new("127.0.0.1", HOSTNAME)
}

#[tokio::test]
async fn logs_in_and_reads_posture() {
    let device = FakeIos::new("SSH Enabled - version 1.99\nAuthentication timeout: 120 secs");
    let port = device.clone().listen().await;
    let connector = TelnetConnector::new(settings(port));

    let mut session = connector
        .connect(&target(), &Credentials::new(USERNAME, SECRET))
        .await
        .expect("login should succeed");
    assert_eq!(session.prompt(), "router1#");

    let output = session
        .send_command(POSTURE_QUERY, Duration::from_secs(5))
        .await
        .expect("posture query");
    assert!(output.success);
    assert_eq!(
        output.content,
        "SSH Enabled - version 1.99\nAuthentication timeout: 120 secs"
    );

    session.disconnect().await.unwrap();
    session.disconnect().await.unwrap();
    assert!(!session.is_connected());
    assert_eq!(
        device.received(),
        vec!["enable", "terminal length 0", POSTURE_QUERY, "exit"]
    );
}

#[tokio::test]
async fn config_set_returns_to_privileged_mode() {
    let device = FakeIos::new("SSH Enabled - version 2.0");
    let port = device.clone().listen().await;
    let connector = TelnetConnector::new(settings(port));
    let mut session = connector
        .connect(&target(), &Credentials::new(USERNAME, SECRET))
        .await
        .unwrap();

    let commands = vec![
        "line vty 0 15".to_string(),
        "transport input telnet ssh".to_string(),
    ];
    session
        .send_config_set(&commands, Duration::from_secs(5))
        .await
        .expect("config set");
    assert_eq!(session.prompt(), "router1#");

    let err = session
        .send_config_set(&["ip ssh versoin 2".to_string()], Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectError::CommandRejected { ref command, .. } if command == "ip ssh versoin 2"));
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn wrong_secret_is_auth_rejected() {
    let device = FakeIos::new("");
    let port = device.listen().await;
    let connector = TelnetConnector::new(settings(port));

    let err = connector
        .connect(&target(), &Credentials::new(USERNAME, "wrong"))
        .await
        .err()
        .expect("login must fail");
    assert_eq!(err.failure_kind(), FailureKind::AuthRejected);
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let connector = TelnetConnector::new(settings(port));

    let err = connector
        .connect(&target(), &Credentials::new(USERNAME, SECRET))
        .await
        .err()
        .expect("nothing listens there");
    assert_eq!(err.failure_kind(), FailureKind::Unreachable);
}

#[tokio::test]
async fn silent_device_times_out_as_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });
    let connector = TelnetConnector::new(SessionSettings {
        connect_timeout: Duration::from_millis(200),
        ..settings(port)
    });

    let err = connector
        .connect(&target(), &Credentials::new(USERNAME, SECRET))
        .await
        .err()
        .expect("device never answers");
    assert!(matches!(err, ConnectError::ConnectTimeout(_)));
    assert_eq!(err.failure_kind(), FailureKind::Unreachable);
}

#[tokio::test]
async fn unkeyed_device_is_remediated_end_to_end() {
    let device = FakeIos::new(
        "SSH Disabled - version 1.99\n\
         %Please create RSA keys to enable SSH (and of atleast 768 bits for SSH v2).",
    );
    let port = device.clone().listen().await;
    let session = settings(port);
    let sink = Arc::new(MemorySink::new());
    let remediator = Remediator::new(
        Arc::new(TelnetConnector::new(session)),
        Arc::new(Credentials::new(USERNAME, SECRET)),
        sink.clone(),
        RemediationOptions::from_session(&session),
    );

    let outcome = remediator.remediate(target()).await;

    assert_eq!(outcome.status, OutcomeStatus::Applied, "{}", outcome.transcript);
    assert!(outcome.transcript.contains("Begin router1"));
    assert!(outcome.transcript.contains("transport input telnet ssh"));
    assert!(!outcome.transcript.contains(SECRET));
    assert!(sink.records().is_empty());

    let received = device.received();
    let position = |command: &str| received.iter().position(|c| c == command).unwrap();
    assert!(position(KEY_GENERATION) < position("ip ssh version 2"));
    assert!(position("ip ssh version 2") < position("transport input telnet ssh"));
    assert_eq!(received.iter().filter(|c| *c == SAVE_CONFIG).count(), 1);
    assert_eq!(received.last().map(String::as_str), Some("exit"));
}

#[tokio::test]
async fn denied_enable_is_other_failure() {
    let device = FakeIos {
        enable_secret: "different-enable-secret",
        ..FakeIos::new("")
    };
    let port = device.clone().listen().await;
    let connector = TelnetConnector::new(settings(port));

    let err = connector
        .connect(&target(), &Credentials::new(USERNAME, SECRET))
        .await
        .err()
        .expect("enable must be refused");
    assert!(matches!(err, ConnectError::PrivilegeDenied(ref prompt) if prompt == "router1>"));
    assert_eq!(err.failure_kind(), FailureKind::Other);
    let received = device.received();
    assert_eq!(received.first().map(String::as_str), Some("enable"));
    assert!(!received.iter().any(|c| c == "terminal length 0"));
}

#[tokio::test]
async fn repeated_line_password_question_is_auth_rejected() {
    let device = FakeIos {
        line_password: true,
        ..FakeIos::new("")
    };
    let port = device.listen().await;
    let connector = TelnetConnector::new(settings(port));

    let err = connector
        .connect(&target(), &Credentials::new(USERNAME, "wrong"))
        .await
        .err()
        .expect("second password question means rejection");
    assert!(matches!(err, ConnectError::AuthRejected(_)));
    assert_eq!(err.failure_kind(), FailureKind::AuthRejected);
}

#[tokio::test]
async fn line_password_device_logs_in() {
    let device = FakeIos {
        line_password: true,
        ..FakeIos::new("SSH Enabled - version 2.0")
    };
    let port = device.clone().listen().await;
    let connector = TelnetConnector::new(settings(port));

    let mut session = connector
        .connect(&target(), &Credentials::new(USERNAME, SECRET))
        .await
        .expect("line password login");
    assert_eq!(session.prompt(), "router1#");
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn refused_key_generation_is_logged_as_other() {
    let device = FakeIos {
        keygen_reply: "% Please define a domain-name first.",
        ..FakeIos::new("SSH Disabled - version 1.99")
    };
    let port = device.clone().listen().await;
    let session = settings(port);
    let sink = Arc::new(MemorySink::new());
    let remediator = Remediator::new(
        Arc::new(TelnetConnector::new(session)),
        Arc::new(Credentials::new(USERNAME, SECRET)),
        sink.clone(),
        RemediationOptions::from_session(&session),
    );

    let outcome = remediator.remediate(target()).await;

    assert_eq!(outcome.status, OutcomeStatus::Failed(FailureKind::Other));
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, FailureKind::Other);
    let received = device.received();
    assert!(!received.iter().any(|c| c == "ip ssh version 2"));
    assert!(!received.iter().any(|c| c == SAVE_CONFIG));
}
