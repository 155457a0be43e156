//! Network reachability signal.

use tokio::sync::watch;

/// Shared online/offline flag with change notifications.
///
/// Whoever observes the network (a platform callback, a CLI flag, a test)
/// calls [`Connectivity::set_online`]; the sync engine subscribes.
#[derive(Clone, Debug)]
pub struct Connectivity {
    sender: watch::Sender<bool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Update the flag. Subscribers are only woken on an actual change.
    pub fn set_online(&self, online: bool) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::debug!(online, "Connectivity changed");
        }
    }

    /// Receiver that is notified on every transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_current_state() {
        let connectivity = Connectivity::offline();
        assert!(!connectivity.is_online());
        connectivity.set_online(true);
        assert!(connectivity.is_online());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_see_transitions_only() {
        let connectivity = Connectivity::offline();
        let mut receiver = connectivity.subscribe();

        connectivity.set_online(false);
        assert!(!receiver.has_changed().unwrap());

        connectivity.set_online(true);
        receiver.changed().await.unwrap();
        assert!(*receiver.borrow_and_update());
    }
}
