//! # Typed Identifiers
//!
//! Zero-cost `u64` wrappers for the identities the messaging layer tracks:
//!
//! - [`ConnectionId`]: reported by a transport when a connection completes its handshake
//! - [`ChannelId`]: process-unique channel identity, derived from the connection id
//!   and immutable once assigned
//! - [`SessionId`]: generation counter of one remote endpoint, bumped on every
//!   reconnect so messages built for an older generation can be fenced off
//!
//! Value `0` is the null id for channels and connections. Sessions start at `0`
//! and only ever move forward.

macro_rules! define_typed_id {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// The null/zero id
            pub const NULL: Self = Self(0);

            #[inline(always)]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            #[inline(always)]
            pub const fn inner(&self) -> u64 {
                self.0
            }

            #[inline(always)]
            pub fn is_null(&self) -> bool {
                self.0 == 0
            }

            /// The id after this one; wraps at `u64::MAX`
            #[inline]
            pub fn next(&self) -> Self {
                Self(self.0.wrapping_add(1))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}[{}]", $label, self.0)
            }
        }

        impl From<u64> for $name {
            #[inline(always)]
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            #[inline(always)]
            fn from(id: $name) -> u64 {
                id.0
            }
        }
    };
}

define_typed_id!(
    /// Process-unique identity of a message channel
    ChannelId, "ChannelID"
);

define_typed_id!(
    /// Connection generation of one remote endpoint
    SessionId, "SessionID"
);

define_typed_id!(
    /// Identity a transport assigns to an established connection
    ConnectionId, "ConnectionID"
);

impl From<ConnectionId> for ChannelId {
    /// Channels take the id of the connection that created them.
    fn from(id: ConnectionId) -> Self {
        ChannelId(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_ids() {
        assert!(ChannelId::NULL.is_null());
        assert!(ConnectionId::default().is_null());
        assert!(!ChannelId::new(3).is_null());
    }

    #[test]
    fn test_session_advances() {
        let s = SessionId::default();
        assert_eq!(s.next(), SessionId::new(1));
        assert!(s.next() > s);
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(ChannelId::new(5).to_string(), "ChannelID[5]");
        assert_eq!(SessionId::new(2).to_string(), "SessionID[2]");
    }

    #[test]
    fn test_channel_id_from_connection() {
        let channel: ChannelId = ConnectionId::new(42).into();
        assert_eq!(channel.inner(), 42);
    }
}
