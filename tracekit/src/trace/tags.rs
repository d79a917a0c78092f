//! Tag keys read or written by the trace core.
//!
//! Keys starting with `_dd.` or `_sampling` are internal and wire-format
//! sensitive; their exact spelling is part of the propagation and
//! submission contract and must not be changed.

/// PEER_SERVICE identifies the logical remote counterpart of an outbound call.
pub const PEER_SERVICE: &str = "peer.service";

/// SPAN_KIND defines the kind of span (client, server, producer, consumer).
pub const SPAN_KIND: &str = "span.kind";

/// SPAN_KIND_CLIENT marks the span as an outbound synchronous call.
pub const SPAN_KIND_CLIENT: &str = "client";

/// SPAN_KIND_PRODUCER marks the span as an outbound message publish.
pub const SPAN_KIND_PRODUCER: &str = "producer";

/// DB_SYSTEM identifies the database management system in use.
pub const DB_SYSTEM: &str = "db.system";

/// DB_SYSTEM_CASSANDRA is the `db.system` value for Apache Cassandra.
pub const DB_SYSTEM_CASSANDRA: &str = "cassandra";

/// CASSANDRA_CONTACT_POINTS holds the initial cluster contact points.
pub const CASSANDRA_CONTACT_POINTS: &str = "db.cassandra.contact.points";

/// DB_NAME is the name of the database being connected to.
pub const DB_NAME: &str = "db.name";

/// DB_INSTANCE is the name of the database instance being connected to.
pub const DB_INSTANCE: &str = "db.instance";

/// MESSAGING_SYSTEM identifies the messaging system in use.
pub const MESSAGING_SYSTEM: &str = "messaging.system";

/// KAFKA_BOOTSTRAP_SERVERS holds the Kafka bootstrap broker addresses.
pub const KAFKA_BOOTSTRAP_SERVERS: &str = "messaging.kafka.bootstrap.servers";

/// RPC_SYSTEM identifies the remote procedure call system in use.
pub const RPC_SYSTEM: &str = "rpc.system";

/// RPC_SERVICE is the full name of the logical RPC service being called.
pub const RPC_SERVICE: &str = "rpc.service";

/// NETWORK_DESTINATION_NAME is the remote hostname or similar where the
/// outbound connection is being made to.
pub const NETWORK_DESTINATION_NAME: &str = "network.destination.name";

/// PEER_HOSTNAME is the hostname of the remote peer.
pub const PEER_HOSTNAME: &str = "peer.hostname";

/// TARGET_HOST sets the target host address.
/// Legacy: kept for backwards compatibility. Use NETWORK_DESTINATION_NAME
/// for hostnames.
pub const TARGET_HOST: &str = "out.host";

/// AWS_SERVICE identifies the AWS service an outbound call targets.
pub const AWS_SERVICE: &str = "aws_service";

/// QUEUE_NAME is the name of the targeted message queue.
pub const QUEUE_NAME: &str = "queuename";

/// TOPIC_NAME is the name of the targeted notification topic.
pub const TOPIC_NAME: &str = "topicname";

/// STREAM_NAME is the name of the targeted data stream.
pub const STREAM_NAME: &str = "streamname";

/// TABLE_NAME is the name of the targeted table.
pub const TABLE_NAME: &str = "tablename";

/// BUCKET_NAME is the name of the targeted storage bucket.
pub const BUCKET_NAME: &str = "bucketname";

/// MANUAL_KEEP is a tag which specifies that the trace to which this span
/// belongs to should be kept when set to true.
pub const MANUAL_KEEP: &str = "manual.keep";

/// MANUAL_DROP is a tag which specifies that the trace to which this span
/// belongs to should be dropped when set to true.
pub const MANUAL_DROP: &str = "manual.drop";

/// KEY_SAMPLING_PRIORITY is the metric key carrying the trace's sampling
/// priority on the wire.
pub const KEY_SAMPLING_PRIORITY: &str = "_sampling_priority_v1";

/// KEY_DECISION_MAKER is the propagating tag recording which sampling
/// mechanism produced a positive sampling priority.
pub const KEY_DECISION_MAKER: &str = "_dd.p.dm";

/// KEY_TRACE_ID_128 carries the hex-encoded upper 64 bits of a 128-bit
/// trace identifier.
pub const KEY_TRACE_ID_128: &str = "_dd.p.tid";

/// KEY_BASE_SERVICE records the globally configured service name on spans
/// whose own service name differs from it.
pub const KEY_BASE_SERVICE: &str = "_dd.base_service";

/// KEY_PEER_SERVICE_SOURCE records the tag name whose value was used as
/// `peer.service`.
pub const KEY_PEER_SERVICE_SOURCE: &str = "_dd.peer.service.source";

/// KEY_PEER_SERVICE_REMAPPED_FROM records the original `peer.service`
/// value replaced through a user-configured remapping.
pub const KEY_PEER_SERVICE_REMAPPED_FROM: &str = "_dd.peer.service.remapped_from";

/// KEY_PROCESS_TAGS carries the serialized process-level tags on the
/// first span of a chunk.
pub const KEY_PROCESS_TAGS: &str = "_dd.tags.process";
