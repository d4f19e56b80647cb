use super::*;
use crate::templates::{self, PASSWORD_PARAM, USERNAME_PARAM};

impl TelnetClient {
    /// Opens a telnet session, logs in, and brings the CLI to privileged mode with paging off.
    ///
    /// The whole exchange up to the first usable prompt is bounded by the connect timeout.
    pub async fn connect(
        target: &DeviceTarget,
        port: u16,
        credentials: &Credentials,
        settings: &SessionSettings,
    ) -> Result<TelnetClient, ConnectError> {
        let device_addr = format!("{}@{}:{}", credentials.username(), target.address, port);
        let mut handler = templates::by_transport(target.transport)?;
        handler.dyn_param.insert(
            USERNAME_PARAM.to_string(),
            format!("{}\n", credentials.username()),
        );
        handler.dyn_param.insert(
            PASSWORD_PARAM.to_string(),
            format!("{}\n", credentials.secret()),
        );

        let channel = telnet::open(&target.address, port, settings.connect_timeout).await?;
        let mut client = TelnetClient {
            device_addr,
            sender: channel.sender,
            recv: channel.recv,
            handler,
            prompt: String::new(),
            io_task: Some(channel.task),
        };

        let timeout = settings.connect_timeout;
        let login = tokio::time::timeout(timeout, client.login()).await;
        match login {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = client.close().await;
                return Err(err);
            }
            Err(_) => {
                let _ = client.close().await;
                return Err(ConnectError::ConnectTimeout(timeout.as_secs()));
            }
        }
        debug!("{} Login successful, prompt '{}'", client.device_addr, client.prompt);

        if let Err(err) = client.enter_privileged(settings.command_timeout).await {
            let _ = client.close().await;
            return Err(err);
        }

        // Paging is also handled by the More state, so a refusal here is not fatal.
        match client
            .write_with_timeout("terminal length 0", settings.command_timeout)
            .await
        {
            Ok(output) if !output.success => {
                debug!("{} terminal length 0 refused", client.device_addr)
            }
            Ok(_) => {}
            Err(err) => {
                let _ = client.close().await;
                return Err(err);
            }
        }

        Ok(client)
    }

    /// Answers login questions until the first CLI prompt shows up.
    async fn login(&mut self) -> Result<(), ConnectError> {
        let mut buffer = String::new();
        let mut passwords_sent = 0usize;

        loop {
            let Some(data) = self.recv.recv().await else {
                return Err(ConnectError::ChannelDisconnectError);
            };
            trace!("{:?}", data);
            buffer.push_str(&data);

            while let Some(newline_pos) = buffer.find('\n') {
                let line = buffer.drain(..=newline_pos).collect::<String>();
                let line = IGNORE_START_LINE.replace(&line, "");
                let trimmed_line = line.trim();
                if AUTH_FAILED.is_match(trimmed_line) {
                    return Err(ConnectError::AuthRejected(trimmed_line.to_string()));
                }
                self.handler.read(trimmed_line);
            }

            if buffer.is_empty() {
                continue;
            }
            let pending = IGNORE_START_LINE.replace(&buffer, "").into_owned();
            if self.handler.read_prompt(&pending) {
                self.handler.read(&pending);
                self.prompt = pending;
                return Ok(());
            }
            if let Some((answer, _)) = self.handler.read_need_write(&pending) {
                let question = self.handler.classify_line(&pending).to_string();
                if question == PASSWORD_PARAM.to_ascii_lowercase() {
                    passwords_sent += 1;
                    if passwords_sent > 1 {
                        return Err(ConnectError::AuthRejected(
                            "password requested again".to_string(),
                        ));
                    }
                } else if question == USERNAME_PARAM.to_ascii_lowercase() && passwords_sent > 0 {
                    return Err(ConnectError::AuthRejected(
                        "login requested again".to_string(),
                    ));
                }
                self.handler.read(&pending);
                buffer.clear();
                self.sender.send(answer).await?;
            }
        }
    }

    /// Moves from user mode to privileged mode if needed.
    async fn enter_privileged(&mut self, timeout: Duration) -> Result<(), ConnectError> {
        if self.handler.current_state() == "enable" {
            return Ok(());
        }
        let path = self.handler.trans_state_write("enable")?;
        for (cmd, target_state) in path {
            let output = self.write_with_timeout(&cmd, timeout).await?;
            if !output.success || self.handler.current_state() != target_state {
                return Err(ConnectError::PrivilegeDenied(self.prompt.trim().to_string()));
            }
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.io_task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Current prompt text.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Executes a command and waits for the full output by matching the prompt.
    pub async fn write_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<Output, ConnectError> {
        let handler = &mut self.handler;
        let recv = &mut self.recv;
        let sender = &self.sender;
        let prompt = &mut self.prompt;

        // Drop anything left over from the previous command.
        while recv.try_recv().is_ok() {}

        sender.send(format!("{}\n", command)).await?;

        let mut clean_output = String::new();
        let mut line_buffer = String::new();

        let result = tokio::time::timeout(timeout, async {
            let mut is_error = false;
            loop {
                let Some(data) = recv.recv().await else {
                    return Err(ConnectError::ChannelDisconnectError);
                };
                line_buffer.push_str(&data);

                while let Some(newline_pos) = line_buffer.find('\n') {
                    let line = line_buffer.drain(..=newline_pos).collect::<String>();
                    let trim_start = IGNORE_START_LINE.replace(&line, "");
                    let trimmed_line = trim_start.trim_end();

                    handler.read(trimmed_line);
                    if handler.error() {
                        is_error = true;
                    }

                    clean_output.push_str(trimmed_line);
                    clean_output.push('\n');
                }

                // The prompt arrives without a trailing newline.
                if !line_buffer.is_empty() {
                    let pending = IGNORE_START_LINE.replace(&line_buffer, "").into_owned();
                    if handler.read_prompt(&pending) {
                        handler.read(&pending);
                        clean_output.push_str(&pending);
                        *prompt = pending;
                        return Ok(!is_error);
                    }
                    if let Some((c, is_record)) = handler.read_need_write(&pending) {
                        handler.read(&pending);
                        if is_record {
                            clean_output.push_str(&pending);
                            clean_output.push('\n');
                        }
                        line_buffer.clear();
                        trace!("Input required: '{:?}'", pending);
                        sender.send(c).await?;
                    }
                }
            }
        })
        .await;

        let success = match result {
            Err(_) => return Err(ConnectError::ExecTimeout(clean_output)),
            Ok(Err(err)) => return Err(err),
            Ok(Ok(success)) => success,
        };

        let all = clean_output;
        let mut content = all.as_str();

        // Remove the echoed command from the beginning of the output
        if !command.is_empty() && content.starts_with(command) {
            content = content
                .strip_prefix(command)
                .unwrap_or(content)
                .trim_start_matches(['\n', '\r']);
        }

        // Remove the trailing prompt
        let content = match content.rfind('\n') {
            Some(pos) => &content[..pos],
            None => "",
        };

        Ok(Output {
            success,
            content: content.to_string(),
            all: all.clone(),
            prompt: self.handler.current_prompt().map(|v| v.to_string()),
        })
    }

    /// Executes a command in a specific device mode with a custom timeout.
    ///
    /// Automatically handles state transitions to reach the target mode.
    pub async fn write_with_mode_and_timeout(
        &mut self,
        command: &str,
        mode: &str,
        timeout: Duration,
    ) -> Result<Output, ConnectError> {
        let mode = mode.to_ascii_lowercase();
        let trans_cmds = self.handler.trans_state_write(&mode)?;
        let mut all = String::new();

        for (t_cmd, target_state) in trans_cmds {
            debug!("Trans state command: {}", t_cmd);
            let mut mode_output = self.write_with_timeout(&t_cmd, timeout).await?;
            all.push_str(&mode_output.all);
            if !mode_output.success || self.handler.current_state() != target_state {
                mode_output.success = false;
                mode_output.all = all;
                return Ok(mode_output);
            }
        }

        let mut cmd_output = self.write_with_timeout(command, timeout).await?;
        all.push_str(&cmd_output.all);
        cmd_output.all = all;
        Ok(cmd_output)
    }

    /// Returns to privileged mode, e.g. after a configuration set.
    async fn return_to_enable(&mut self, timeout: Duration) -> Result<(), ConnectError> {
        for (cmd, target_state) in self.handler.trans_state_write("enable")? {
            self.write_with_timeout(&cmd, timeout).await?;
            if self.handler.current_state() != target_state {
                return Err(ConnectError::UnreachableState(target_state));
            }
        }
        Ok(())
    }

    /// Closes the session.
    pub async fn close(&mut self) -> Result<(), ConnectError> {
        let Some(task) = self.io_task.take() else {
            return Ok(());
        };
        debug!("{} Closing telnet session...", self.device_addr);

        self.recv.close();
        if !task.is_finished() {
            if let Err(e) = self.sender.send("exit\n".to_string()).await {
                debug!("Failed to send exit command: {:?}", e);
            }
            // Give the device a moment to close its side first.
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        task.abort();

        debug!("{} Telnet session closed", self.device_addr);
        Ok(())
    }
}

#[async_trait]
impl DeviceSession for TelnetClient {
    async fn send_command(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<Output, ConnectError> {
        if self.io_task.is_none() {
            return Err(ConnectError::ConnectClosedError);
        }
        self.write_with_mode_and_timeout(command, "enable", timeout)
            .await
    }

    async fn send_config_set(
        &mut self,
        commands: &[String],
        timeout: Duration,
    ) -> Result<Output, ConnectError> {
        if self.io_task.is_none() {
            return Err(ConnectError::ConnectClosedError);
        }
        let mut all = String::new();
        let mut content = String::new();
        for command in commands {
            let output = self
                .write_with_mode_and_timeout(command, "config", timeout)
                .await?;
            all.push_str(&output.all);
            if !output.success {
                return Err(ConnectError::CommandRejected {
                    command: command.clone(),
                    output: output.content.trim().to_string(),
                });
            }
            if !output.content.is_empty() {
                content.push_str(&output.content);
                content.push('\n');
            }
        }
        self.return_to_enable(timeout).await?;
        Ok(Output {
            success: true,
            content,
            all,
            prompt: self.handler.current_prompt().map(|v| v.to_string()),
        })
    }

    async fn disconnect(&mut self) -> Result<(), ConnectError> {
        self.close().await
    }
}

impl Drop for TelnetClient {
    fn drop(&mut self) {
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
    }
}
