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

use std::sync::Arc;
use tokio::sync::watch;

/// A thin wrapper around `tokio::sync::watch` that holds the sender side open for the lifetime of
/// all clones, so the current value can always be read and updated without a live receiver.
#[derive(Debug)]
pub struct Watch<T> {
    sender: Arc<watch::Sender<T>>,
}

impl<T> Clone for Watch<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Watch<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> T {
        self.sender.borrow().clone()
    }

    pub fn send(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Wait until the value satisfies the predicate. Returns immediately if it already does.
    pub async fn wait_until<F>(&self, predicate: F)
    where F: FnMut(&T) -> bool {
        let mut receiver = self.sender.subscribe();
        // The error case requires the sender to be dropped, which cannot happen while `self` holds
        // it, so the result can be safely ignored.
        let _ = receiver.wait_for(predicate).await;
    }
}

impl Watch<bool> {
    pub fn set(&self) {
        self.send(true);
    }

    pub fn is_set(&self) -> bool {
        self.current()
    }

    pub async fn wait_until_set(&self) {
        self.wait_until(|set| *set).await;
    }
}
