//! Script management requests from other threads.
//!
//! The interpolator and its scripts live on the render thread. Other threads
//! hold a [`ScriptClient`] and send requests over a channel; the render thread
//! applies them between frames, so a compile or unload never lands in the
//! middle of an interpolation call.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use crate::error::{ClientError, CompileError, HandleError};
use crate::script_registry::ScriptHandle;
use crate::stroke::SampleEvent;

/// Producer side of the raw sample hand-off.
pub type SampleSender = Sender<SampleEvent>;

pub(crate) enum ScriptCommand {
    Compile {
        source: String,
        reply: Sender<Result<ScriptHandle, CompileError>>,
    },
    Activate {
        handle: ScriptHandle,
        reply: Sender<Result<(), HandleError>>,
    },
    Unload {
        handle: ScriptHandle,
        reply: Sender<Result<(), HandleError>>,
    },
}

/// The answer to a request, delivered once the render thread processes it.
pub struct PendingReply<T> {
    rx: Receiver<T>,
}

impl<T> PendingReply<T> {
    fn channel() -> (Sender<T>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }

    /// Block until the request has been processed.
    pub fn wait(self) -> Result<T, ClientError> {
        self.rx.recv().map_err(|_| ClientError::Disconnected)
    }

    /// Return the reply if it has arrived, `Ok(None)` if it is still pending.
    pub fn try_take(&self) -> Result<Option<T>, ClientError> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ClientError::Disconnected),
        }
    }
}

/// Cloneable, `Send` handle for managing scripts from any thread.
#[derive(Clone)]
pub struct ScriptClient {
    tx: Sender<ScriptCommand>,
}

impl ScriptClient {
    pub(crate) fn new(tx: Sender<ScriptCommand>) -> Self {
        Self { tx }
    }

    fn send<T>(
        &self,
        make: impl FnOnce(Sender<T>) -> ScriptCommand,
    ) -> Result<PendingReply<T>, ClientError> {
        let (reply, pending) = PendingReply::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| ClientError::Disconnected)?;
        Ok(pending)
    }

    pub fn compile(
        &self,
        source: impl Into<String>,
    ) -> Result<PendingReply<Result<ScriptHandle, CompileError>>, ClientError> {
        let source = source.into();
        self.send(|reply| ScriptCommand::Compile { source, reply })
    }

    pub fn activate(
        &self,
        handle: ScriptHandle,
    ) -> Result<PendingReply<Result<(), HandleError>>, ClientError> {
        self.send(|reply| ScriptCommand::Activate { handle, reply })
    }

    pub fn unload(
        &self,
        handle: ScriptHandle,
    ) -> Result<PendingReply<Result<(), HandleError>>, ClientError> {
        self.send(|reply| ScriptCommand::Unload { handle, reply })
    }
}
