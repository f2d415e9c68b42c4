//! # Message Type Registry
//!
//! ## Purpose
//!
//! Closed table of every message type that may appear on the wire. Each type has
//! a numeric code (never reused across releases) and a symbolic name. The table
//! is a hand-maintained ordered list, [`MessageType::ALL`], checked once at
//! startup by [`MessageTypeRegistry::global`]; there is no runtime registration.
//!
//! ## Self-Check
//!
//! - codes are non-zero, strictly ascending and therefore unique
//! - names are unique, `UPPER_SNAKE_CASE`, end in `_MESSAGE` and never start with `_`
//! - every listed record resolves back to its variant by code, and every code the
//!   enum accepts is listed
//!
//! A failed check is a [`RegistryError`]; callers abort initialization on it.

use std::collections::HashMap;
use std::fmt;

use num_enum::TryFromPrimitive;
use once_cell::sync::OnceCell;

use crate::common::errors::RegistryError;

/// Wire message types
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive)]
pub enum MessageType {
    Ping = 1,
    Pong = 2,
    RequestRoot = 8,
    LockRequest = 9,
    CommitTransaction = 10,
    RequestRootResponse = 11,
    RequestManagedObject = 12,
    RequestManagedObjectResponse = 13,
    BroadcastTransaction = 14,
    ObjectIdBatchRequest = 18,
    ObjectIdBatchRequestResponse = 19,
    AcknowledgeTransaction = 24,
    LockResponse = 26,
    ClientHandshake = 28,
    BatchTransactionAck = 29,
    ClientHandshakeAck = 30,
    ConfigPush = 31,
    OverrideApplicationConfig = 32,
    LockRecall = 33,
    Jmx = 34,
    LockQueryResponse = 35,
    JmxRemoteMessageConnection = 36,
    MemoryDataStoreRequest = 37,
    MemoryDataStoreResponse = 38,
    ClusterMembershipEvent = 39,
    ClientJmxReady = 40,
    ObjectsNotFoundResponse = 41,
    Bench = 42,
    LockStat = 43,
    LockStatisticsResponse = 44,
    CompletedTransactionLowWatermark = 45,
    GroupWrapper = 46,
    GroupHandshake = 47,
    NodesWithObjects = 48,
    NodesWithObjectsResponse = 49,
    KeysForOrphanedValues = 50,
    KeysForOrphanedValuesResponse = 51,
    NodeMetaData = 52,
    NodeMetaDataResponse = 53,
    StripeIdMap = 54,
    SyncWriteTransactionReceived = 55,
    GetValueServerMapRequest = 56,
    GetValueServerMapResponse = 57,
    GetAllSizeServerMapRequest = 58,
    GetAllSizeServerMapResponse = 59,
    TunneledDomainsChanged = 60,
    ObjectNotFoundServerMapResponse = 61,
    EvictionServerMapBroadcast = 62,
    GetAllKeysServerMapRequest = 63,
    GetAllKeysServerMapResponse = 64,
    SearchQueryRequest = 65,
    SearchQueryResponse = 66,
    NodesWithKeys = 67,
    NodesWithKeysResponse = 68,
    InvalidateObjects = 69,
    ClientHandshakeRefused = 70,
}

impl MessageType {
    /// Every type, in ascending code order.
    pub const ALL: [MessageType; 56] = [
        MessageType::Ping,
        MessageType::Pong,
        MessageType::RequestRoot,
        MessageType::LockRequest,
        MessageType::CommitTransaction,
        MessageType::RequestRootResponse,
        MessageType::RequestManagedObject,
        MessageType::RequestManagedObjectResponse,
        MessageType::BroadcastTransaction,
        MessageType::ObjectIdBatchRequest,
        MessageType::ObjectIdBatchRequestResponse,
        MessageType::AcknowledgeTransaction,
        MessageType::LockResponse,
        MessageType::ClientHandshake,
        MessageType::BatchTransactionAck,
        MessageType::ClientHandshakeAck,
        MessageType::ConfigPush,
        MessageType::OverrideApplicationConfig,
        MessageType::LockRecall,
        MessageType::Jmx,
        MessageType::LockQueryResponse,
        MessageType::JmxRemoteMessageConnection,
        MessageType::MemoryDataStoreRequest,
        MessageType::MemoryDataStoreResponse,
        MessageType::ClusterMembershipEvent,
        MessageType::ClientJmxReady,
        MessageType::ObjectsNotFoundResponse,
        MessageType::Bench,
        MessageType::LockStat,
        MessageType::LockStatisticsResponse,
        MessageType::CompletedTransactionLowWatermark,
        MessageType::GroupWrapper,
        MessageType::GroupHandshake,
        MessageType::NodesWithObjects,
        MessageType::NodesWithObjectsResponse,
        MessageType::KeysForOrphanedValues,
        MessageType::KeysForOrphanedValuesResponse,
        MessageType::NodeMetaData,
        MessageType::NodeMetaDataResponse,
        MessageType::StripeIdMap,
        MessageType::SyncWriteTransactionReceived,
        MessageType::GetValueServerMapRequest,
        MessageType::GetValueServerMapResponse,
        MessageType::GetAllSizeServerMapRequest,
        MessageType::GetAllSizeServerMapResponse,
        MessageType::TunneledDomainsChanged,
        MessageType::ObjectNotFoundServerMapResponse,
        MessageType::EvictionServerMapBroadcast,
        MessageType::GetAllKeysServerMapRequest,
        MessageType::GetAllKeysServerMapResponse,
        MessageType::SearchQueryRequest,
        MessageType::SearchQueryResponse,
        MessageType::NodesWithKeys,
        MessageType::NodesWithKeysResponse,
        MessageType::InvalidateObjects,
        MessageType::ClientHandshakeRefused,
    ];

    /// Wire code
    #[inline(always)]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Resolve a wire code. Unknown codes yield `None`, which callers treat as a
    /// protocol error.
    #[inline]
    pub fn from_code(code: u16) -> Option<Self> {
        Self::try_from(code).ok()
    }

    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Ping => "PING_MESSAGE",
            MessageType::Pong => "PONG_MESSAGE",
            MessageType::RequestRoot => "REQUEST_ROOT_MESSAGE",
            MessageType::LockRequest => "LOCK_REQUEST_MESSAGE",
            MessageType::CommitTransaction => "COMMIT_TRANSACTION_MESSAGE",
            MessageType::RequestRootResponse => "REQUEST_ROOT_RESPONSE_MESSAGE",
            MessageType::RequestManagedObject => "REQUEST_MANAGED_OBJECT_MESSAGE",
            MessageType::RequestManagedObjectResponse => "REQUEST_MANAGED_OBJECT_RESPONSE_MESSAGE",
            MessageType::BroadcastTransaction => "BROADCAST_TRANSACTION_MESSAGE",
            MessageType::ObjectIdBatchRequest => "OBJECT_ID_BATCH_REQUEST_MESSAGE",
            MessageType::ObjectIdBatchRequestResponse => "OBJECT_ID_BATCH_REQUEST_RESPONSE_MESSAGE",
            MessageType::AcknowledgeTransaction => "ACKNOWLEDGE_TRANSACTION_MESSAGE",
            MessageType::LockResponse => "LOCK_RESPONSE_MESSAGE",
            MessageType::ClientHandshake => "CLIENT_HANDSHAKE_MESSAGE",
            MessageType::BatchTransactionAck => "BATCH_TRANSACTION_ACK_MESSAGE",
            MessageType::ClientHandshakeAck => "CLIENT_HANDSHAKE_ACK_MESSAGE",
            MessageType::ConfigPush => "CONFIG_PUSH_MESSAGE",
            MessageType::OverrideApplicationConfig => "OVERRIDE_APPLICATION_CONFIG_MESSAGE",
            MessageType::LockRecall => "LOCK_RECALL_MESSAGE",
            MessageType::Jmx => "JMX_MESSAGE",
            MessageType::LockQueryResponse => "LOCK_QUERY_RESPONSE_MESSAGE",
            MessageType::JmxRemoteMessageConnection => "JMXREMOTE_MESSAGE_CONNECTION_MESSAGE",
            MessageType::MemoryDataStoreRequest => "MEMORY_DATA_STORE_REQUEST_MESSAGE",
            MessageType::MemoryDataStoreResponse => "MEMORY_DATA_STORE_RESPONSE_MESSAGE",
            MessageType::ClusterMembershipEvent => "CLUSTER_MEMBERSHIP_EVENT_MESSAGE",
            MessageType::ClientJmxReady => "CLIENT_JMX_READY_MESSAGE",
            MessageType::ObjectsNotFoundResponse => "OBJECTS_NOT_FOUND_RESPONSE_MESSAGE",
            MessageType::Bench => "BENCH_MESSAGE",
            MessageType::LockStat => "LOCK_STAT_MESSAGE",
            MessageType::LockStatisticsResponse => "LOCK_STATISTICS_RESPONSE_MESSAGE",
            MessageType::CompletedTransactionLowWatermark => "COMPLETED_TRANSACTION_LOWWATERMARK_MESSAGE",
            MessageType::GroupWrapper => "GROUP_WRAPPER_MESSAGE",
            MessageType::GroupHandshake => "GROUP_HANDSHAKE_MESSAGE",
            MessageType::NodesWithObjects => "NODES_WITH_OBJECTS_MESSAGE",
            MessageType::NodesWithObjectsResponse => "NODES_WITH_OBJECTS_RESPONSE_MESSAGE",
            MessageType::KeysForOrphanedValues => "KEYS_FOR_ORPHANED_VALUES_MESSAGE",
            MessageType::KeysForOrphanedValuesResponse => "KEYS_FOR_ORPHANED_VALUES_RESPONSE_MESSAGE",
            MessageType::NodeMetaData => "NODE_META_DATA_MESSAGE",
            MessageType::NodeMetaDataResponse => "NODE_META_DATA_RESPONSE_MESSAGE",
            MessageType::StripeIdMap => "STRIPE_ID_MAP_MESSAGE",
            MessageType::SyncWriteTransactionReceived => "SYNC_WRITE_TRANSACTION_RECEIVED_MESSAGE",
            MessageType::GetValueServerMapRequest => "GET_VALUE_SERVER_MAP_REQUEST_MESSAGE",
            MessageType::GetValueServerMapResponse => "GET_VALUE_SERVER_MAP_RESPONSE_MESSAGE",
            MessageType::GetAllSizeServerMapRequest => "GET_ALL_SIZE_SERVER_MAP_REQUEST_MESSAGE",
            MessageType::GetAllSizeServerMapResponse => "GET_ALL_SIZE_SERVER_MAP_RESPONSE_MESSAGE",
            MessageType::TunneledDomainsChanged => "TUNNELED_DOMAINS_CHANGED_MESSAGE",
            MessageType::ObjectNotFoundServerMapResponse => "OBJECT_NOT_FOUND_SERVER_MAP_RESPONSE_MESSAGE",
            MessageType::EvictionServerMapBroadcast => "EVICTION_SERVER_MAP_BROADCAST_MESSAGE",
            MessageType::GetAllKeysServerMapRequest => "GET_ALL_KEYS_SERVER_MAP_REQUEST_MESSAGE",
            MessageType::GetAllKeysServerMapResponse => "GET_ALL_KEYS_SERVER_MAP_RESPONSE_MESSAGE",
            MessageType::SearchQueryRequest => "SEARCH_QUERY_REQUEST_MESSAGE",
            MessageType::SearchQueryResponse => "SEARCH_QUERY_RESPONSE_MESSAGE",
            MessageType::NodesWithKeys => "NODES_WITH_KEYS_MESSAGE",
            MessageType::NodesWithKeysResponse => "NODES_WITH_KEYS_RESPONSE_MESSAGE",
            MessageType::InvalidateObjects => "INVALIDATE_OBJECTS_MESSAGE",
            MessageType::ClientHandshakeRefused => "CLIENT_HANDSHAKE_REFUSED_MESSAGE",
        }
    }

    pub fn record(&self) -> MessageTypeRecord {
        MessageTypeRecord {
            code: self.code(),
            name: self.name(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One `(code, name)` row of the type table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageTypeRecord {
    pub code: u16,
    pub name: &'static str,
}

impl MessageTypeRecord {
    pub const fn new(code: u16, name: &'static str) -> Self {
        Self { code, name }
    }
}

/// Check ordering, uniqueness and naming over a table of records.
pub fn validate_records(records: &[MessageTypeRecord]) -> Result<(), RegistryError> {
    let mut by_code: HashMap<u16, &'static str> = HashMap::with_capacity(records.len());
    let mut names: HashMap<&'static str, u16> = HashMap::with_capacity(records.len());
    let mut previous: Option<u16> = None;

    for record in records {
        validate_name(record.name)?;

        if record.code == 0 {
            return Err(RegistryError::ReservedCode { name: record.name });
        }
        if let Some(first) = by_code.insert(record.code, record.name) {
            return Err(RegistryError::DuplicateCode {
                code: record.code,
                first,
                second: record.name,
            });
        }
        if names.insert(record.name, record.code).is_some() {
            return Err(RegistryError::DuplicateName { name: record.name });
        }
        if let Some(prev) = previous {
            if record.code < prev {
                return Err(RegistryError::OutOfOrder {
                    name: record.name,
                    code: record.code,
                    previous: prev,
                });
            }
        }
        previous = Some(record.code);
    }

    Ok(())
}

fn validate_name(name: &'static str) -> Result<(), RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::invalid_name(name, "empty name"));
    }
    if name.starts_with('_') {
        return Err(RegistryError::invalid_name(name, "leading underscore"));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
    {
        return Err(RegistryError::invalid_name(name, "not UPPER_SNAKE_CASE"));
    }
    if !name.ends_with("_MESSAGE") {
        return Err(RegistryError::invalid_name(name, "missing _MESSAGE suffix"));
    }
    Ok(())
}

/// Validated, read-only view of the message type table
#[derive(Debug)]
pub struct MessageTypeRegistry {
    by_code: HashMap<u16, MessageType>,
    by_name: HashMap<&'static str, MessageType>,
    records: Vec<MessageTypeRecord>,
}

static REGISTRY: OnceCell<Result<MessageTypeRegistry, RegistryError>> = OnceCell::new();

impl MessageTypeRegistry {
    /// Build and self-check the registry from [`MessageType::ALL`].
    pub fn build() -> Result<Self, RegistryError> {
        let records: Vec<MessageTypeRecord> =
            MessageType::ALL.iter().map(MessageType::record).collect();
        validate_records(&records)?;

        let mut by_code = HashMap::with_capacity(records.len());
        let mut by_name = HashMap::with_capacity(records.len());
        for record in &records {
            match MessageType::from_code(record.code) {
                Some(ty) if ty.name() == record.name => {
                    by_code.insert(record.code, ty);
                    by_name.insert(record.name, ty);
                }
                _ => {
                    return Err(RegistryError::Unresolved {
                        name: record.name,
                        code: record.code,
                    })
                }
            }
        }

        // Every code the enum accepts must be listed.
        for code in 1..=u16::MAX {
            if let Some(ty) = MessageType::from_code(code) {
                if !by_code.contains_key(&code) {
                    return Err(RegistryError::Unresolved {
                        name: ty.name(),
                        code,
                    });
                }
            }
        }

        Ok(Self {
            by_code,
            by_name,
            records,
        })
    }

    /// Process-wide registry, built and checked on first use.
    pub fn global() -> Result<&'static Self, RegistryError> {
        REGISTRY
            .get_or_init(Self::build)
            .as_ref()
            .map_err(Clone::clone)
    }

    #[inline]
    pub fn lookup(&self, code: u16) -> Option<MessageType> {
        self.by_code.get(&code).copied()
    }

    pub fn lookup_name(&self, name: &str) -> Option<MessageType> {
        self.by_name.get(name).copied()
    }

    pub fn records(&self) -> &[MessageTypeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_valid() {
        let registry = MessageTypeRegistry::global().unwrap();
        assert_eq!(registry.len(), MessageType::ALL.len());
        assert_eq!(registry.lookup(1), Some(MessageType::Ping));
        assert_eq!(registry.lookup(70), Some(MessageType::ClientHandshakeRefused));
    }

    #[test]
    fn test_unknown_code_not_found() {
        let registry = MessageTypeRegistry::global().unwrap();
        assert_eq!(registry.lookup(0), None);
        assert_eq!(registry.lookup(3), None);
        assert_eq!(registry.lookup(9999), None);
        assert_eq!(MessageType::from_code(3), None);
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = MessageTypeRegistry::global().unwrap();
        assert_eq!(registry.lookup_name("PONG_MESSAGE"), Some(MessageType::Pong));
        assert_eq!(registry.lookup_name("pong_message"), None);
    }

    #[test]
    fn test_names_and_codes() {
        assert_eq!(MessageType::Ping.name(), "PING_MESSAGE");
        assert_eq!(MessageType::JmxRemoteMessageConnection.code(), 36);
        assert_eq!(
            MessageType::CompletedTransactionLowWatermark.to_string(),
            "COMPLETED_TRANSACTION_LOWWATERMARK_MESSAGE"
        );
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let records = [
            MessageTypeRecord::new(1, "PING_MESSAGE"),
            MessageTypeRecord::new(1, "PONG_MESSAGE"),
        ];
        assert_eq!(
            validate_records(&records),
            Err(RegistryError::DuplicateCode {
                code: 1,
                first: "PING_MESSAGE",
                second: "PONG_MESSAGE"
            })
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let records = [
            MessageTypeRecord::new(1, "PING_MESSAGE"),
            MessageTypeRecord::new(2, "PING_MESSAGE"),
        ];
        assert_eq!(
            validate_records(&records),
            Err(RegistryError::DuplicateName {
                name: "PING_MESSAGE"
            })
        );
    }

    #[test]
    fn test_naming_convention_enforced() {
        for bad in ["_PING_MESSAGE", "Ping_MESSAGE", "PING", ""] {
            let records = [MessageTypeRecord::new(1, bad)];
            assert!(
                matches!(
                    validate_records(&records),
                    Err(RegistryError::InvalidName { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_out_of_order_and_reserved_rejected() {
        let records = [
            MessageTypeRecord::new(5, "B_MESSAGE"),
            MessageTypeRecord::new(4, "A_MESSAGE"),
        ];
        assert!(matches!(
            validate_records(&records),
            Err(RegistryError::OutOfOrder { code: 4, .. })
        ));

        let records = [MessageTypeRecord::new(0, "ZERO_MESSAGE")];
        assert!(matches!(
            validate_records(&records),
            Err(RegistryError::ReservedCode { .. })
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn registered_types_resolve_by_code_and_name(index in 0..MessageType::ALL.len()) {
                let registry = MessageTypeRegistry::global().unwrap();
                let message_type = MessageType::ALL[index];
                prop_assert_eq!(MessageType::from_code(message_type.code()), Some(message_type));
                prop_assert_eq!(registry.lookup(message_type.code()), Some(message_type));
                prop_assert_eq!(registry.lookup_name(message_type.name()), Some(message_type));
            }

            #[test]
            fn unregistered_codes_never_resolve(code in any::<u16>()) {
                let registry = MessageTypeRegistry::global().unwrap();
                let known = MessageType::ALL.iter().any(|t| t.code() == code);
                prop_assert_eq!(MessageType::from_code(code).is_some(), known);
                prop_assert_eq!(registry.lookup(code).is_some(), known);
            }
        }
    }
}
