use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use shmxfer::config::{ChannelArgs, DEFAULT_OUTPUT};
use shmxfer::handshake::{create_sink, receive_all};
use shmxfer::key::write_keyfile;
use shmxfer::{signal, Error, Role, Session, TransferConfig};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Receive a file from shmxfer-send through shared memory."
)]
struct Args {
    /// Destination file, truncated on every run.
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    #[command(flatten)]
    channel: ChannelArgs,

    /// Write the key file first if it does not exist.
    #[arg(long)]
    create_keyfile: bool,

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
            eprintln!("shmxfer-recv: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> shmxfer::Result<()> {
    let config = args
        .channel
        .apply(TransferConfig::default().output(&args.output))?;
    signal::install()?;

    if args.create_keyfile {
        let created = write_keyfile(&config.keyfile).map_err(|source| Error::KeyDerivation {
            path: config.keyfile.clone(),
            source,
        })?;
        if created {
            info!(keyfile = %config.keyfile.display(), "created key file");
        }
    }

    let key = config.key()?;
    let mut session = Session::acquire_or_create(key, config.capacity, Role::Consumer)?;
    let mut sink = create_sink(&config.output)?;

    let (buffer, channel) = session.split()?;
    let transfer = receive_all(&mut sink, &*buffer, &mut channel.consumer_end())?;

    session.finish()?;
    info!(
        output = %config.output.display(),
        chunks = transfer.chunks,
        bytes = transfer.bytes,
        "transfer complete"
    );
    Ok(())
}
