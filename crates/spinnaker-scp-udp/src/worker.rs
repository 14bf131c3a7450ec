// crates/spinnaker-scp-udp/src/worker.rs
//! A dedicated thread owning one SCP connection.
//!
//! Callers on any thread hand jobs to the worker over a channel and block
//! on a per-job reply channel. The connection itself is only ever touched by
//! the worker thread.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info};
use spinnaker_scp::{
    Clock, CoreAddress, CoreInfo, DatagramTransport, ScpConnection, ScpError, ScpPacket,
    ScpRequest,
};
use std::thread::{self, JoinHandle};

type Reply<R> = Sender<Result<R, ScpError>>;

enum Job {
    Request(ScpRequest, Reply<ScpPacket>),
    Read(CoreAddress, u32, usize, Reply<Vec<u8>>),
    Write(CoreAddress, u32, Vec<u8>, Reply<()>),
    Version(CoreAddress, Reply<CoreInfo>),
    Shutdown,
}

pub struct ScpWorker {
    jobs: Sender<Job>,
    thread: Option<JoinHandle<()>>,
}

fn stopped() -> ScpError {
    ScpError::ConnectionClosed("worker thread has stopped".into())
}

impl ScpWorker {
    /// Moves `connection` onto a new thread named `scp-worker`.
    pub fn spawn<T, C>(connection: ScpConnection<T, C>) -> Result<Self, ScpError>
    where
        T: DatagramTransport + Send + 'static,
        C: Clock + Send + 'static,
    {
        let (jobs, queue) = crossbeam_channel::unbounded();
        let thread = thread::Builder::new()
            .name("scp-worker".into())
            .spawn(move || run(connection, queue))
            .map_err(|e| ScpError::Io(e.to_string()))?;
        Ok(Self {
            jobs,
            thread: Some(thread),
        })
    }

    fn call<R>(&self, job: impl FnOnce(Reply<R>) -> Job) -> Result<R, ScpError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.jobs.send(job(tx)).map_err(|_| stopped())?;
        rx.recv().map_err(|_| stopped())?
    }

    pub fn send_scp(&self, request: ScpRequest) -> Result<ScpPacket, ScpError> {
        self.call(|tx| Job::Request(request, tx))
    }

    pub fn read(&self, core: CoreAddress, address: u32, length: usize) -> Result<Vec<u8>, ScpError> {
        self.call(|tx| Job::Read(core, address, length, tx))
    }

    pub fn write(&self, core: CoreAddress, address: u32, data: impl Into<Vec<u8>>) -> Result<(), ScpError> {
        let data = data.into();
        self.call(|tx| Job::Write(core, address, data, tx))
    }

    pub fn get_software_version(&self, core: CoreAddress) -> Result<CoreInfo, ScpError> {
        self.call(|tx| Job::Version(core, tx))
    }

    /// Stops the worker after the jobs already queued and joins it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            // The worker may already be gone; joining is all that is left.
            let _ = self.jobs.send(Job::Shutdown);
            if thread.join().is_err() {
                error!("SCP worker thread panicked");
            }
        }
    }
}

impl Drop for ScpWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<T: DatagramTransport, C: Clock>(mut connection: ScpConnection<T, C>, queue: Receiver<Job>) {
    info!("SCP worker started");
    // Replies are dropped silently when the caller has gone away.
    for job in queue.iter() {
        match job {
            Job::Request(request, tx) => {
                let _ = tx.send(connection.send_scp(request));
            }
            Job::Read(core, address, length, tx) => {
                let _ = tx.send(connection.read(core, address, length));
            }
            Job::Write(core, address, data, tx) => {
                let _ = tx.send(connection.write(core, address, &data));
            }
            Job::Version(core, tx) => {
                let _ = tx.send(connection.get_software_version(core));
            }
            Job::Shutdown => {
                debug!("SCP worker received shutdown");
                break;
            }
        }
    }
    connection.close("worker shut down");
    info!("SCP worker stopped");
}
