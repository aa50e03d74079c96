//! Chat application: session lifecycle plus console input

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};

use asciichat_core::TextMessage;
use asciichat_runtime::{Session, SessionError, SessionHandle, SessionRole};

use crate::commands::ConsoleCommand;
use crate::config::AppConfig;
use crate::console::ConsoleHandler;
use crate::error::Result;
use crate::pattern::{run_test_pattern, TestPattern};

/// One chat session driven from the terminal
pub struct ChatApp {
    config: AppConfig,
}

impl ChatApp {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Connect, chat until either side leaves, then tear down
    pub async fn run(self) -> Result<()> {
        let session_config = self.config.session_config()?;
        let console = Arc::new(ConsoleHandler::stdout(
            self.config.cli.colored_output,
            self.config.cli.show_video,
        ));

        match &session_config.role {
            SessionRole::Listen { bind } => {
                console.system(&format!("Listening on {}", bind));
                console.system("Share your IP with your peer so they can connect");
            }
            SessionRole::Dial { remote } => {
                console.system(&format!("Connecting to {}...", remote));
            }
        }

        let mut session = Session::new(session_config, console.clone());
        let stop = session.stop_handle();

        let signal_stop = stop.clone();
        let signal_task = tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Failed to listen for shutdown signal: {}", e);
                        return;
                    }
                    info!("Received shutdown signal");
                    signal_stop.stop();
                }
                _ = signal_stop.stopped() => {}
            }
        });

        let handle = match session.start().await {
            Ok(handle) => handle,
            Err(SessionError::Stopped) => {
                signal_task.abort();
                console.system("Cancelled");
                return Ok(());
            }
            Err(e) => {
                signal_task.abort();
                return Err(e.into());
            }
        };

        if let Some(peer) = handle.peer_addr() {
            console.system(&format!("Connected to {}", peer));
        }
        console.system("Type /help for commands");
        console.system("Type :) :D <3 :fire: :rocket: and more for emojis!");

        let pattern_task = tokio::spawn(run_test_pattern(
            handle.clone(),
            TestPattern::new(self.config.cli.width),
            self.config.cli.fps,
            stop.clone(),
        ));
        let input_task = tokio::spawn(run_console_input(
            BufReader::new(tokio::io::stdin()),
            handle.clone(),
            console.clone(),
        ));

        session.wait().await;
        session.shutdown().await;

        // stdin reads cannot be interrupted
        input_task.abort();
        signal_task.abort();
        if let Err(e) = pattern_task.await {
            debug!(error = %e, "Test pattern task ended abnormally");
        }

        let stats = handle.stats();
        info!(
            frames_sent = stats.frames_sent,
            frames_received = stats.frames_received,
            "Chat ended"
        );
        console.system("Goodbye!");
        Ok(())
    }
}

/// Read console lines and act on them until `/quit` or end of input
pub async fn run_console_input<R>(reader: R, handle: SessionHandle, console: Arc<ConsoleHandler>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let command = ConsoleCommand::parse(&line);
                if execute_command(command, &handle, &console).await.is_break() {
                    handle.stop();
                    break;
                }
            }
            Ok(None) => {
                debug!("Console input closed");
                break;
            }
            Err(e) => {
                error!("Console input failed: {}", e);
                break;
            }
        }
    }
}

/// Apply one console command to the session
pub async fn execute_command(
    command: ConsoleCommand,
    handle: &SessionHandle,
    console: &ConsoleHandler,
) -> ControlFlow<()> {
    match command {
        ConsoleCommand::Chat(body) => {
            if handle.push_text(body.clone()).await {
                console.local_text(&handle.local_identity(), &TextMessage::chat(body));
            } else {
                console.system("Not connected to send message");
            }
        }
        ConsoleCommand::Ping(body) => {
            if handle.push_alert(body.clone()).await {
                console.local_text(&handle.local_identity(), &TextMessage::alert(body));
            } else {
                console.system("Not connected to send ping");
            }
        }
        ConsoleCommand::ColorChat(color) => {
            let mut identity = handle.local_identity();
            identity.chat_color = color;
            console.system(&format!("Chat color changed to {}", color));
            if !handle.send(identity.into()).await {
                console.system("Not connected; the peer still sees your old color");
            }
        }
        ConsoleCommand::Quit => return ControlFlow::Break(()),
        ConsoleCommand::Empty => {}
        other => {
            for line in other.feedback() {
                console.system(&line);
            }
        }
    }
    ControlFlow::Continue(())
}
