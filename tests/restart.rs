use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use nix::libc::c_int;
use nix::sys::pthread::{pthread_kill, pthread_self};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use shmxfer::key::write_keyfile;
use shmxfer::msg::ChunkReady;
use shmxfer::{signal, ControlChannel, TransferKey};
use tempfile::tempdir;

extern "C" fn ignore(_: c_int) {}

// Own test binary: the SIGUSR1 disposition is process-wide, and the
// interrupt flag must stay clear.
#[test]
fn unrelated_signal_does_not_abort_receive() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("keyfile.txt");
    write_keyfile(&path)?;
    let key = TransferKey::derive(&path, b'u')?;

    // No SA_RESTART: the blocked msgrcv sees EINTR.
    let action = SigAction::new(SigHandler::Handler(ignore), SaFlags::empty(), SigSet::empty());
    unsafe { sigaction(Signal::SIGUSR1, &action) }?;

    let mut channel = ControlChannel::new(key)?;

    let (tx, rx) = mpsc::channel();
    let receiver = thread::spawn(move || -> shmxfer::Result<ChunkReady> {
        let peer = ControlChannel::open(key)?;
        let _ = tx.send(pthread_self());
        peer.recv::<ChunkReady>()
    });

    let thread_id = rx.recv()?;
    thread::sleep(Duration::from_millis(100));
    pthread_kill(thread_id, Signal::SIGUSR1)?;
    thread::sleep(Duration::from_millis(100));
    assert!(!receiver.is_finished());
    channel.send(&ChunkReady { size: 5 })?;

    let res = receiver.join().map_err(|e| anyhow!("{:?}", e))?;
    assert_eq!(res?, ChunkReady { size: 5 });
    assert!(!signal::interrupted());
    channel.remove()?;
    Ok(())
}
