//! Kafka protocol error codes.
//!
//! Every response carries a nullable `i16` error code; `0` means success and
//! is modeled here as `None` so call sites read `if let Some(err) = ...`
//! rather than matching a sentinel variant.

use thiserror::Error;

use super::traits::{ReadError, ReadType, WriteError, WriteType};

/// A broker-reported protocol error.
///
/// See <https://kafka.apache.org/protocol#protocol_error_codes>.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("UNKNOWN_SERVER_ERROR")]
    UnknownServerError,
    #[error("OFFSET_OUT_OF_RANGE")]
    OffsetOutOfRange,
    #[error("CORRUPT_MESSAGE")]
    CorruptMessage,
    #[error("UNKNOWN_TOPIC_OR_PARTITION")]
    UnknownTopicOrPartition,
    #[error("INVALID_FETCH_SIZE")]
    InvalidFetchSize,
    #[error("LEADER_NOT_AVAILABLE")]
    LeaderNotAvailable,
    #[error("NOT_LEADER_OR_FOLLOWER")]
    NotLeaderOrFollower,
    #[error("REQUEST_TIMED_OUT")]
    RequestTimedOut,
    #[error("BROKER_NOT_AVAILABLE")]
    BrokerNotAvailable,
    #[error("REPLICA_NOT_AVAILABLE")]
    ReplicaNotAvailable,
    #[error("MESSAGE_TOO_LARGE")]
    MessageTooLarge,
    #[error("STALE_CONTROLLER_EPOCH")]
    StaleControllerEpoch,
    #[error("OFFSET_METADATA_TOO_LARGE")]
    OffsetMetadataTooLarge,
    #[error("NETWORK_EXCEPTION")]
    NetworkException,
    #[error("COORDINATOR_LOAD_IN_PROGRESS")]
    CoordinatorLoadInProgress,
    #[error("COORDINATOR_NOT_AVAILABLE")]
    CoordinatorNotAvailable,
    #[error("NOT_COORDINATOR")]
    NotCoordinator,
    #[error("INVALID_TOPIC_EXCEPTION")]
    InvalidTopicException,
    #[error("RECORD_LIST_TOO_LARGE")]
    RecordListTooLarge,
    #[error("NOT_ENOUGH_REPLICAS")]
    NotEnoughReplicas,
    #[error("NOT_ENOUGH_REPLICAS_AFTER_APPEND")]
    NotEnoughReplicasAfterAppend,
    #[error("INVALID_REQUIRED_ACKS")]
    InvalidRequiredAcks,
    #[error("ILLEGAL_GENERATION")]
    IllegalGeneration,
    #[error("INCONSISTENT_GROUP_PROTOCOL")]
    InconsistentGroupProtocol,
    #[error("INVALID_GROUP_ID")]
    InvalidGroupId,
    #[error("UNKNOWN_MEMBER_ID")]
    UnknownMemberId,
    #[error("INVALID_SESSION_TIMEOUT")]
    InvalidSessionTimeout,
    #[error("REBALANCE_IN_PROGRESS")]
    RebalanceInProgress,
    #[error("INVALID_COMMIT_OFFSET_SIZE")]
    InvalidCommitOffsetSize,
    #[error("TOPIC_AUTHORIZATION_FAILED")]
    TopicAuthorizationFailed,
    #[error("GROUP_AUTHORIZATION_FAILED")]
    GroupAuthorizationFailed,
    #[error("CLUSTER_AUTHORIZATION_FAILED")]
    ClusterAuthorizationFailed,
    #[error("INVALID_TIMESTAMP")]
    InvalidTimestamp,
    #[error("UNSUPPORTED_SASL_MECHANISM")]
    UnsupportedSaslMechanism,
    #[error("ILLEGAL_SASL_STATE")]
    IllegalSaslState,
    #[error("UNSUPPORTED_VERSION")]
    UnsupportedVersion,
    #[error("TOPIC_ALREADY_EXISTS")]
    TopicAlreadyExists,
    #[error("INVALID_PARTITIONS")]
    InvalidPartitions,
    #[error("INVALID_REPLICATION_FACTOR")]
    InvalidReplicationFactor,
    #[error("INVALID_REPLICA_ASSIGNMENT")]
    InvalidReplicaAssignment,
    #[error("INVALID_CONFIG")]
    InvalidConfig,
    #[error("NOT_CONTROLLER")]
    NotController,
    #[error("INVALID_REQUEST")]
    InvalidRequest,
    #[error("UNSUPPORTED_FOR_MESSAGE_FORMAT")]
    UnsupportedForMessageFormat,
    #[error("POLICY_VIOLATION")]
    PolicyViolation,
    #[error("OUT_OF_ORDER_SEQUENCE_NUMBER")]
    OutOfOrderSequenceNumber,
    #[error("DUPLICATE_SEQUENCE_NUMBER")]
    DuplicateSequenceNumber,
    #[error("INVALID_PRODUCER_EPOCH")]
    InvalidProducerEpoch,
    #[error("INVALID_TXN_STATE")]
    InvalidTxnState,
    #[error("INVALID_PRODUCER_ID_MAPPING")]
    InvalidProducerIdMapping,
    #[error("INVALID_TRANSACTION_TIMEOUT")]
    InvalidTransactionTimeout,
    #[error("CONCURRENT_TRANSACTIONS")]
    ConcurrentTransactions,
    #[error("TRANSACTION_COORDINATOR_FENCED")]
    TransactionCoordinatorFenced,
    #[error("TRANSACTIONAL_ID_AUTHORIZATION_FAILED")]
    TransactionalIdAuthorizationFailed,
    #[error("SECURITY_DISABLED")]
    SecurityDisabled,
    #[error("OPERATION_NOT_ATTEMPTED")]
    OperationNotAttempted,
    #[error("KAFKA_STORAGE_ERROR")]
    KafkaStorageError,
    #[error("LOG_DIR_NOT_FOUND")]
    LogDirNotFound,
    #[error("SASL_AUTHENTICATION_FAILED")]
    SaslAuthenticationFailed,
    #[error("UNKNOWN_PRODUCER_ID")]
    UnknownProducerId,
    #[error("REASSIGNMENT_IN_PROGRESS")]
    ReassignmentInProgress,
    #[error("DELEGATION_TOKEN_AUTH_DISABLED")]
    DelegationTokenAuthDisabled,
    #[error("DELEGATION_TOKEN_NOT_FOUND")]
    DelegationTokenNotFound,
    #[error("DELEGATION_TOKEN_OWNER_MISMATCH")]
    DelegationTokenOwnerMismatch,
    #[error("DELEGATION_TOKEN_REQUEST_NOT_ALLOWED")]
    DelegationTokenRequestNotAllowed,
    #[error("DELEGATION_TOKEN_AUTHORIZATION_FAILED")]
    DelegationTokenAuthorizationFailed,
    #[error("DELEGATION_TOKEN_EXPIRED")]
    DelegationTokenExpired,
    #[error("INVALID_PRINCIPAL_TYPE")]
    InvalidPrincipalType,
    #[error("NON_EMPTY_GROUP")]
    NonEmptyGroup,
    #[error("GROUP_ID_NOT_FOUND")]
    GroupIdNotFound,
    #[error("FETCH_SESSION_ID_NOT_FOUND")]
    FetchSessionIdNotFound,
    #[error("INVALID_FETCH_SESSION_EPOCH")]
    InvalidFetchSessionEpoch,
    #[error("LISTENER_NOT_FOUND")]
    ListenerNotFound,
    #[error("TOPIC_DELETION_DISABLED")]
    TopicDeletionDisabled,
    #[error("FENCED_LEADER_EPOCH")]
    FencedLeaderEpoch,
    #[error("UNKNOWN_LEADER_EPOCH")]
    UnknownLeaderEpoch,
    #[error("UNSUPPORTED_COMPRESSION_TYPE")]
    UnsupportedCompressionType,
    #[error("STALE_BROKER_EPOCH")]
    StaleBrokerEpoch,
    #[error("OFFSET_NOT_AVAILABLE")]
    OffsetNotAvailable,
    #[error("MEMBER_ID_REQUIRED")]
    MemberIdRequired,
    #[error("PREFERRED_LEADER_NOT_AVAILABLE")]
    PreferredLeaderNotAvailable,
    #[error("GROUP_MAX_SIZE_REACHED")]
    GroupMaxSizeReached,
    #[error("FENCED_INSTANCE_ID")]
    FencedInstanceId,
    #[error("ELIGIBLE_LEADERS_NOT_AVAILABLE")]
    EligibleLeadersNotAvailable,
    #[error("ELECTION_NOT_NEEDED")]
    ElectionNotNeeded,
    #[error("NO_REASSIGNMENT_IN_PROGRESS")]
    NoReassignmentInProgress,
    #[error("GROUP_SUBSCRIBED_TO_TOPIC")]
    GroupSubscribedToTopic,
    #[error("INVALID_RECORD")]
    InvalidRecord,
    #[error("UNSTABLE_OFFSET_COMMIT")]
    UnstableOffsetCommit,
    #[error("THROTTLING_QUOTA_EXCEEDED")]
    ThrottlingQuotaExceeded,
    #[error("PRODUCER_FENCED")]
    ProducerFenced,
    #[error("RESOURCE_NOT_FOUND")]
    ResourceNotFound,
    #[error("DUPLICATE_RESOURCE")]
    DuplicateResource,
    #[error("UNACCEPTABLE_CREDENTIAL")]
    UnacceptableCredential,
    #[error("INCONSISTENT_VOTER_SET")]
    InconsistentVoterSet,
    #[error("INVALID_UPDATE_VERSION")]
    InvalidUpdateVersion,
    #[error("FEATURE_UPDATE_FAILED")]
    FeatureUpdateFailed,
    #[error("PRINCIPAL_DESERIALIZATION_FAILURE")]
    PrincipalDeserializationFailure,
    #[error("FENCED_MEMBER_EPOCH")]
    FencedMemberEpoch,
    #[error("UNRELEASED_INSTANCE_ID")]
    UnreleasedInstanceId,
    #[error("UNSUPPORTED_ASSIGNOR")]
    UnsupportedAssignor,
    #[error("STALE_MEMBER_EPOCH")]
    StaleMemberEpoch,
    #[error("unknown protocol error code {0}")]
    Unknown(i16),
}

impl Error {
    /// Maps a raw `i16` error code to an `Option<Error>`, `0` meaning no
    /// error at all (the common case for every response type in this
    /// crate).
    pub fn new(code: i16) -> Option<Self> {
        use Error::*;

        Some(match code {
            0 => return None,
            -1 => UnknownServerError,
            1 => OffsetOutOfRange,
            2 => CorruptMessage,
            3 => UnknownTopicOrPartition,
            4 => InvalidFetchSize,
            5 => LeaderNotAvailable,
            6 => NotLeaderOrFollower,
            7 => RequestTimedOut,
            8 => BrokerNotAvailable,
            9 => ReplicaNotAvailable,
            10 => MessageTooLarge,
            11 => StaleControllerEpoch,
            12 => OffsetMetadataTooLarge,
            13 => NetworkException,
            14 => CoordinatorLoadInProgress,
            15 => CoordinatorNotAvailable,
            16 => NotCoordinator,
            17 => InvalidTopicException,
            18 => RecordListTooLarge,
            19 => NotEnoughReplicas,
            20 => NotEnoughReplicasAfterAppend,
            21 => InvalidRequiredAcks,
            22 => IllegalGeneration,
            23 => InconsistentGroupProtocol,
            24 => InvalidGroupId,
            25 => UnknownMemberId,
            26 => InvalidSessionTimeout,
            27 => RebalanceInProgress,
            28 => InvalidCommitOffsetSize,
            29 => TopicAuthorizationFailed,
            30 => GroupAuthorizationFailed,
            31 => ClusterAuthorizationFailed,
            32 => InvalidTimestamp,
            33 => UnsupportedSaslMechanism,
            34 => IllegalSaslState,
            35 => UnsupportedVersion,
            36 => TopicAlreadyExists,
            37 => InvalidPartitions,
            38 => InvalidReplicationFactor,
            39 => InvalidReplicaAssignment,
            40 => InvalidConfig,
            41 => NotController,
            42 => InvalidRequest,
            43 => UnsupportedForMessageFormat,
            44 => PolicyViolation,
            45 => OutOfOrderSequenceNumber,
            46 => DuplicateSequenceNumber,
            47 => InvalidProducerEpoch,
            48 => InvalidTxnState,
            49 => InvalidProducerIdMapping,
            50 => InvalidTransactionTimeout,
            51 => ConcurrentTransactions,
            52 => TransactionCoordinatorFenced,
            53 => TransactionalIdAuthorizationFailed,
            54 => SecurityDisabled,
            55 => OperationNotAttempted,
            56 => KafkaStorageError,
            57 => LogDirNotFound,
            58 => SaslAuthenticationFailed,
            59 => UnknownProducerId,
            60 => ReassignmentInProgress,
            61 => DelegationTokenAuthDisabled,
            62 => DelegationTokenNotFound,
            63 => DelegationTokenOwnerMismatch,
            64 => DelegationTokenRequestNotAllowed,
            65 => DelegationTokenAuthorizationFailed,
            66 => DelegationTokenExpired,
            67 => InvalidPrincipalType,
            68 => NonEmptyGroup,
            69 => GroupIdNotFound,
            70 => FetchSessionIdNotFound,
            71 => InvalidFetchSessionEpoch,
            72 => ListenerNotFound,
            73 => TopicDeletionDisabled,
            74 => FencedLeaderEpoch,
            75 => UnknownLeaderEpoch,
            76 => UnsupportedCompressionType,
            77 => StaleBrokerEpoch,
            78 => OffsetNotAvailable,
            79 => MemberIdRequired,
            80 => PreferredLeaderNotAvailable,
            81 => GroupMaxSizeReached,
            82 => FencedInstanceId,
            83 => EligibleLeadersNotAvailable,
            84 => ElectionNotNeeded,
            85 => NoReassignmentInProgress,
            86 => GroupSubscribedToTopic,
            87 => InvalidRecord,
            88 => UnstableOffsetCommit,
            89 => ThrottlingQuotaExceeded,
            90 => ProducerFenced,
            91 => ResourceNotFound,
            92 => DuplicateResource,
            93 => UnacceptableCredential,
            94 => InconsistentVoterSet,
            95 => InvalidUpdateVersion,
            96 => FeatureUpdateFailed,
            97 => PrincipalDeserializationFailure,
            110 => FencedMemberEpoch,
            111 => UnreleasedInstanceId,
            112 => UnsupportedAssignor,
            113 => StaleMemberEpoch,
            other => Unknown(other),
        })
    }

    pub fn code(&self) -> i16 {
        use Error::*;

        match self {
            UnknownServerError => -1,
            OffsetOutOfRange => 1,
            CorruptMessage => 2,
            UnknownTopicOrPartition => 3,
            InvalidFetchSize => 4,
            LeaderNotAvailable => 5,
            NotLeaderOrFollower => 6,
            RequestTimedOut => 7,
            BrokerNotAvailable => 8,
            ReplicaNotAvailable => 9,
            MessageTooLarge => 10,
            StaleControllerEpoch => 11,
            OffsetMetadataTooLarge => 12,
            NetworkException => 13,
            CoordinatorLoadInProgress => 14,
            CoordinatorNotAvailable => 15,
            NotCoordinator => 16,
            InvalidTopicException => 17,
            RecordListTooLarge => 18,
            NotEnoughReplicas => 19,
            NotEnoughReplicasAfterAppend => 20,
            InvalidRequiredAcks => 21,
            IllegalGeneration => 22,
            InconsistentGroupProtocol => 23,
            InvalidGroupId => 24,
            UnknownMemberId => 25,
            InvalidSessionTimeout => 26,
            RebalanceInProgress => 27,
            InvalidCommitOffsetSize => 28,
            TopicAuthorizationFailed => 29,
            GroupAuthorizationFailed => 30,
            ClusterAuthorizationFailed => 31,
            InvalidTimestamp => 32,
            UnsupportedSaslMechanism => 33,
            IllegalSaslState => 34,
            UnsupportedVersion => 35,
            TopicAlreadyExists => 36,
            InvalidPartitions => 37,
            InvalidReplicationFactor => 38,
            InvalidReplicaAssignment => 39,
            InvalidConfig => 40,
            NotController => 41,
            InvalidRequest => 42,
            UnsupportedForMessageFormat => 43,
            PolicyViolation => 44,
            OutOfOrderSequenceNumber => 45,
            DuplicateSequenceNumber => 46,
            InvalidProducerEpoch => 47,
            InvalidTxnState => 48,
            InvalidProducerIdMapping => 49,
            InvalidTransactionTimeout => 50,
            ConcurrentTransactions => 51,
            TransactionCoordinatorFenced => 52,
            TransactionalIdAuthorizationFailed => 53,
            SecurityDisabled => 54,
            OperationNotAttempted => 55,
            KafkaStorageError => 56,
            LogDirNotFound => 57,
            SaslAuthenticationFailed => 58,
            UnknownProducerId => 59,
            ReassignmentInProgress => 60,
            DelegationTokenAuthDisabled => 61,
            DelegationTokenNotFound => 62,
            DelegationTokenOwnerMismatch => 63,
            DelegationTokenRequestNotAllowed => 64,
            DelegationTokenAuthorizationFailed => 65,
            DelegationTokenExpired => 66,
            InvalidPrincipalType => 67,
            NonEmptyGroup => 68,
            GroupIdNotFound => 69,
            FetchSessionIdNotFound => 70,
            InvalidFetchSessionEpoch => 71,
            ListenerNotFound => 72,
            TopicDeletionDisabled => 73,
            FencedLeaderEpoch => 74,
            UnknownLeaderEpoch => 75,
            UnsupportedCompressionType => 76,
            StaleBrokerEpoch => 77,
            OffsetNotAvailable => 78,
            MemberIdRequired => 79,
            PreferredLeaderNotAvailable => 80,
            GroupMaxSizeReached => 81,
            FencedInstanceId => 82,
            EligibleLeadersNotAvailable => 83,
            ElectionNotNeeded => 84,
            NoReassignmentInProgress => 85,
            GroupSubscribedToTopic => 86,
            InvalidRecord => 87,
            UnstableOffsetCommit => 88,
            ThrottlingQuotaExceeded => 89,
            ProducerFenced => 90,
            ResourceNotFound => 91,
            DuplicateResource => 92,
            UnacceptableCredential => 93,
            InconsistentVoterSet => 94,
            InvalidUpdateVersion => 95,
            FeatureUpdateFailed => 96,
            PrincipalDeserializationFailure => 97,
            FencedMemberEpoch => 110,
            UnreleasedInstanceId => 111,
            UnsupportedAssignor => 112,
            StaleMemberEpoch => 113,
            Unknown(code) => *code,
        }
    }

    /// Whether the core should retry an operation that failed with this
    /// error, per spec §7's taxonomy (`ProtocolError{code, context}`).
    pub fn can_retry(&self) -> bool {
        use Error::*;

        matches!(
            self,
            CorruptMessage
                | UnknownTopicOrPartition
                | LeaderNotAvailable
                | NotLeaderOrFollower
                | RequestTimedOut
                | NetworkException
                | CoordinatorLoadInProgress
                | CoordinatorNotAvailable
                | NotCoordinator
                | NotEnoughReplicas
                | NotEnoughReplicasAfterAppend
                | RebalanceInProgress
                | NotController
                | KafkaStorageError
                | FencedLeaderEpoch
                | UnknownLeaderEpoch
                | OffsetNotAvailable
                | ReassignmentInProgress
                | UnstableOffsetCommit
                | ThrottlingQuotaExceeded
                | UnknownServerError
                | StaleMemberEpoch
        )
    }

    /// Whether the owning producer identity must be re-initialized via a
    /// fresh `InitProducerId` before any further send can succeed.
    pub fn fences_producer(&self) -> bool {
        matches!(
            self,
            Error::InvalidProducerEpoch
                | Error::OutOfOrderSequenceNumber
                | Error::ProducerFenced
                | Error::TransactionCoordinatorFenced
        )
    }

    /// Whether the consumer group membership must be dropped and re-joined
    /// from scratch. `FencedMemberEpoch` is the modern (KIP-848) protocol's
    /// equivalent of `UnknownMemberId`/`FencedInstanceId`: it means the
    /// coordinator no longer recognizes this member's epoch and the client
    /// must clear its identity and rejoin at epoch 0.
    pub fn cancels_membership(&self) -> bool {
        matches!(
            self,
            Error::UnknownMemberId | Error::FencedInstanceId | Error::FencedMemberEpoch
        )
    }

    /// Whether the error should trigger a forced cluster metadata refresh.
    pub fn refreshes_metadata(&self) -> bool {
        matches!(
            self,
            Error::NotLeaderOrFollower
                | Error::UnknownTopicOrPartition
                | Error::LeaderNotAvailable
                | Error::NotCoordinator
                | Error::FencedLeaderEpoch
        )
    }
}

impl<R> ReadType<R> for Option<Error>
where
    R: std::io::Read,
{
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Error::new(i16::read(reader)?))
    }
}

impl<W> WriteType<W> for Option<Error>
where
    W: std::io::Write,
{
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.map(|e| e.code()).unwrap_or(0).write(writer)
    }
}
