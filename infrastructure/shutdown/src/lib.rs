// Copyright 2021. The Sesame Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! A convenient, cloneable shutdown signal.
//!
//! [Shutdown] is the trigger half: calling [`Shutdown::trigger`] (or dropping the `Shutdown`
//! instance) resolves every [ShutdownSignal] obtained from it. A `ShutdownSignal` is itself a
//! `Future` so it can be `select`ed against any other pending work, and it can be polled for
//! completion without awaiting via [`ShutdownSignal::is_triggered`].

use futures::{
    channel::oneshot,
    future::{FutureExt, Shared},
    task::noop_waker,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// The owner side of a shutdown signal. Trigger this to release all listening `ShutdownSignal`s.
#[derive(Debug)]
pub struct Shutdown {
    trigger: Option<oneshot::Sender<()>>,
    signal: ShutdownSignal,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            trigger: Some(tx),
            signal: ShutdownSignal { inner: rx.shared() },
        }
    }

    /// Convert this instance into a signal that resolves once `trigger` is called or the
    /// `Shutdown` is dropped.
    pub fn to_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.trigger.is_none()
    }

    /// Trigger the shutdown. Subsequent calls are a no-op.
    pub fn trigger(&mut self) {
        if let Some(trigger) = self.trigger.take() {
            let _ = trigger.send(());
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side of a `Shutdown`. Cloning is cheap, and every clone resolves when the owning
/// `Shutdown` triggers. Note that dropping the `Shutdown` without triggering also resolves the
/// signal, so an orphaned signal never waits forever.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    inner: Shared<oneshot::Receiver<()>>,
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        if self.inner.peek().is_some() {
            return true;
        }
        // `peek` only reports completion once the shared future has been polled, so poll a clone
        // here; otherwise a trigger that nobody awaited yet would go unnoticed
        let waker = noop_waker();
        let mut context = Context::from_waker(&waker);
        Pin::new(&mut self.inner.clone()).poll(&mut context).is_ready()
    }

    /// Wait for the shutdown to trigger without consuming the signal.
    pub async fn wait(&self) {
        self.clone().await
    }
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A cancelled oneshot (Shutdown dropped) counts as triggered
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}
