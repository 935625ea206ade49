use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use nix::sys::pthread::{pthread_kill, pthread_self};
use nix::sys::signal::Signal;
use shmxfer::key::write_keyfile;
use shmxfer::msg::ChunkReady;
use shmxfer::{receive_all, signal, ControlChannel, Error, Role, Session, TransferKey};
use tempfile::tempdir;

// Lives in its own test binary: the interrupt flag is process-wide, and the
// handler is one-shot, so only a single SIGINT may be delivered here.
#[test]
fn interrupt_unblocks_consumer_and_cleans_up() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("keyfile.txt");
    write_keyfile(&path)?;
    let key = TransferKey::derive(&path, b'i')?;

    signal::install()?;

    let (tx, rx) = mpsc::channel();
    let consumer = thread::spawn(move || -> shmxfer::Result<()> {
        let mut session = Session::acquire_or_create(key, 64, Role::Consumer)?;
        let _ = tx.send(pthread_self());
        let (buffer, channel) = session.split()?;
        receive_all(&mut Vec::new(), &*buffer, &mut channel.consumer_end())?;
        session.finish()
    });

    let thread_id = rx.recv()?;
    // Give the consumer time to block in msgrcv.
    thread::sleep(Duration::from_millis(200));
    pthread_kill(thread_id, Signal::SIGINT)?;

    let res = consumer.join().map_err(|e| anyhow!("{:?}", e))?;
    assert!(matches!(res, Err(Error::Interrupted)), "{:?}", res);
    assert!(signal::interrupted());
    assert!(ControlChannel::open(key).is_err());

    // With the flag already raised, a fresh receive must not block at all.
    let other = TransferKey::derive(&path, b'j')?;
    let mut channel = ControlChannel::new(other)?;
    let start = Instant::now();
    let res = channel.recv::<ChunkReady>();
    assert!(matches!(res, Err(Error::Interrupted)), "{:?}", res);
    assert!(start.elapsed() < Duration::from_millis(100));
    channel.remove()?;
    Ok(())
}
