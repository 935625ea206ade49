use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use shmxfer::config::ChannelArgs;
use shmxfer::handshake::{open_source, send_all};
use shmxfer::{signal, Role, Session, TransferConfig};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(version, about = "Send a file to shmxfer-recv through shared memory.")]
struct Args {
    /// File to send.
    file: PathBuf,

    #[command(flatten)]
    channel: ChannelArgs,

    #[arg(long, default_value_t = Level::INFO)]
    log: Level,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("shmxfer-send: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> shmxfer::Result<()> {
    let config = args.channel.apply(TransferConfig::default())?;
    signal::install()?;

    let mut source = open_source(&args.file)?;
    let key = config.key()?;
    let mut session = Session::acquire_or_create(key, config.capacity, Role::Producer)?;

    let (buffer, channel) = session.split()?;
    let transfer = send_all(&mut source, buffer, &mut channel.producer_end())?;

    session.finish()?;
    info!(
        file = %args.file.display(),
        chunks = transfer.chunks,
        bytes = transfer.bytes,
        "transfer complete"
    );
    Ok(())
}
