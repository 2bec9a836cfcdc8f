use std::io::{self, Write};

use env_logger::Builder;
use tokio::{
    fs::{create_dir_all, metadata, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        watch,
    },
};

use crate::config;
use crate::core::{ActResult, ErrorContext};

pub struct AsyncWriter {
    sender: UnboundedSender<Vec<u8>>,
}

impl Write for AsyncWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let data = buf.to_vec();
        self.sender.send(data).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Routes `log` records to a file through a background writer.
///
/// Call [`Logger::init_env_logger`] first, then drive [`Logger::run`] on the
/// runtime until shutdown.
pub struct Logger {
    sender: UnboundedSender<Vec<u8>>,
    receiver: UnboundedReceiver<Vec<u8>>,
    config: config::Log,
}

impl Logger {
    pub fn new(config: config::Log) -> Self {
        let (sender, receiver) = unbounded_channel::<Vec<u8>>();
        Self {
            sender,
            receiver,
            config,
        }
    }

    fn create_async_writer(&self) -> AsyncWriter {
        AsyncWriter {
            sender: self.sender.clone(),
        }
    }

    pub fn init_env_logger(&self) -> ActResult<()> {
        let writer = self.create_async_writer();
        Builder::from_env(env_logger::Env::default())
            .filter(None, self.config.level_filter())
            .target(env_logger::Target::Pipe(Box::new(writer)))
            .try_init()
            .with_context("Failed to install logger")
    }

    /// Write queued records to the configured file until `shutdown` turns
    /// true or every writer is gone.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ActResult<()> {
        let log_file_path = &self.config.path;

        if let Some(parent) = std::path::Path::new(log_file_path).parent() {
            if metadata(parent).await.is_err() {
                create_dir_all(parent)
                    .await
                    .with_context("Failed to create log path")?;
            }
        }

        let mut file = BufWriter::new(
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(log_file_path)
                .await
                .with_context("Failed to open or create log file")?,
        );

        // The logger's own sender would keep the channel open forever.
        drop(self.sender);

        loop {
            tokio::select! {
                biased;
                // Shutdown signal handling
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        log::info!("Shutdown signal received, stopping write log");
                        break;
                    }
                },

                data = self.receiver.recv() => {
                    match data {
                        Some(data) => {
                            if let Err(e) = file.write_all(&data).await {
                                log::error!("Failed to write to log file: {}", e);
                            }
                        }
                        None => {
                            log::info!("Log channel closed, stopping write log");
                            break;
                        }
                    }
                }
            }
        }

        // Keep what was queued before shutdown.
        while let Ok(data) = self.receiver.try_recv() {
            if let Err(e) = file.write_all(&data).await {
                log::error!("Failed to write to log file: {}", e);
            }
        }

        file.flush().await.with_context("Failed to flush log file")
    }
}
