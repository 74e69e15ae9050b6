use std::io;

use bgsink::sinks::{ConsoleSink, FileSink};
use bgsink::{log_message, ActiveConfig, Dispatcher, Level, ShutdownPolicy, Sink};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct CliArguments {
    /// Raise diagnostics verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Number of messages to send
    #[arg(long, default_value_t = 10)]
    count: usize,
    /// What workers do with queued messages on shutdown
    #[arg(long, default_value_t = ShutdownPolicy::Drain)]
    policy: ShutdownPolicy,
    #[command(subcommand)]
    sub_command: Option<SubCommands>,
}

#[derive(Subcommand)]
enum SubCommands {
    Console {},
    File {
        #[arg()]
        path: String,
    },
}

fn save_messages(dispatcher: &Dispatcher, count: usize) -> bgsink::Result<()> {
    for i in 0..count {
        let message = log_message!(Level::Info, "message {} of {}", i + 1, count)
            .with_field("index", i as i64);
        dispatcher.save(message)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> bgsink::Result<()> {
    let command = CliArguments::parse();

    let filter = match command.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();

    let dispatcher = Dispatcher::with_config(
        ActiveConfig::new("bgsink-dispatcher").with_shutdown(command.policy),
    )?;

    match command.sub_command {
        Some(SubCommands::Console {}) => {
            let sink = Sink::text_with_config(
                ConsoleSink::new(),
                ConsoleSink::print,
                ActiveConfig::new("console").with_shutdown(command.policy),
            )?;
            let handle = dispatcher.add_sink(sink)?;

            save_messages(&dispatcher, command.count)?;
            dispatcher.barrier()?.await?;

            let lines = handle.call(|console| console.lines())?.await?;
            eprintln!("{} lines written to stdout", lines);
        }
        Some(SubCommands::File { path }) => {
            let sink = Sink::with_config(
                FileSink::create(&path)?,
                FileSink::receive,
                ActiveConfig::new("file").with_shutdown(command.policy),
            )?;
            let handle = dispatcher.add_sink(sink)?;

            save_messages(&dispatcher, command.count)?;
            dispatcher.barrier()?.await?;

            let bytes = handle
                .try_call(|file| {
                    file.flush()?;
                    Ok::<_, io::Error>(file.bytes_written())
                })?
                .await?;
            eprintln!("{} bytes written to {}", bytes, path);
        }
        None => {
            eprintln!("No sub command specified");
        }
    }

    Ok(())
}
