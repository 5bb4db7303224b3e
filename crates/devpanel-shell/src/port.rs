//! The cross-document message port collaborator.
//!
//! The panel shell is embedded in a host document and talks to it (and to
//! each embedded plugin panel) through a duplex message port. [`FramePort`]
//! is the narrow trait the bridge needs from that mechanism; the host
//! application adapts its real port type to it.
//!
//! [`InProcessPort`] is a synchronous in-memory implementation used by the
//! tests and by embedders that render panels in the same process: two linked
//! ports where posting on one dispatches to the listeners of the other.

use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use devpanel_core::channel::{ChannelError, ListenerSet, MessageListener, Subscription};

/// A duplex cross-document message port.
pub trait FramePort: Send + Sync {
    /// Posts one frame to the other side.
    fn post(&self, frame: Value) -> Result<(), ChannelError>;

    /// Registers a listener for frames arriving from the other side.
    fn on_frame(&self, listener: MessageListener) -> Subscription;
}

/// One end of a linked in-memory port pair.
pub struct InProcessPort {
    local: Arc<ListenerSet>,
    peer: Mutex<Weak<ListenerSet>>,
}

impl InProcessPort {
    /// Creates two linked ports. Posting on either end dispatches
    /// synchronously to listeners registered on the other end.
    pub fn pair() -> (Arc<InProcessPort>, Arc<InProcessPort>) {
        let a = Arc::new(InProcessPort {
            local: ListenerSet::new(),
            peer: Mutex::new(Weak::new()),
        });
        let b = Arc::new(InProcessPort {
            local: ListenerSet::new(),
            peer: Mutex::new(Weak::new()),
        });
        *a.peer.lock().expect("lock poisoned") = Arc::downgrade(&b.local);
        *b.peer.lock().expect("lock poisoned") = Arc::downgrade(&a.local);
        (a, b)
    }
}

impl FramePort for InProcessPort {
    fn post(&self, frame: Value) -> Result<(), ChannelError> {
        let peer = self.peer.lock().expect("lock poisoned").upgrade();
        match peer {
            Some(peer) => {
                peer.dispatch(&frame);
                Ok(())
            }
            None => Err(ChannelError::Closed),
        }
    }

    fn on_frame(&self, listener: MessageListener) -> Subscription {
        self.local.add(listener)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_post_reaches_the_other_end_only() {
        let (a, b) = InProcessPort::pair();

        let a_seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let b_seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let a_in = Arc::clone(&a_seen);
        let b_in = Arc::clone(&b_seen);
        let _sa = a.on_frame(Arc::new(move |f| a_in.lock().unwrap().push(f.clone())));
        let _sb = b.on_frame(Arc::new(move |f| b_in.lock().unwrap().push(f.clone())));

        a.post(json!("from-a")).unwrap();

        assert!(a_seen.lock().unwrap().is_empty());
        assert_eq!(*b_seen.lock().unwrap(), vec![json!("from-a")]);
    }

    #[test]
    fn test_post_after_peer_dropped_reports_closed() {
        let (a, b) = InProcessPort::pair();
        drop(b);

        assert!(matches!(a.post(json!(1)), Err(ChannelError::Closed)));
    }

    #[test]
    fn test_both_directions_are_independent() {
        let (a, b) = InProcessPort::pair();

        let b_seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let b_in = Arc::clone(&b_seen);
        let _sb = b.on_frame(Arc::new(move |f| b_in.lock().unwrap().push(f.clone())));

        a.post(json!(1)).unwrap();
        b.post(json!(2)).unwrap(); // nobody listening on `a`; still succeeds

        assert_eq!(*b_seen.lock().unwrap(), vec![json!(1)]);
    }
}
