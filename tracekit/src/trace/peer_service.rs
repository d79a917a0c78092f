//! Derivation of the `peer.service` tag for outbound spans.
//!
//! Resolution is a pure function of the tags already present on a
//! finishing span: an ordered rule table keyed on which "system" tag
//! family the span carries is evaluated top to bottom and the first
//! candidate source tag actually present wins. The order of the rules and
//! of their sources is a behavioral contract and must not be changed.

use crate::tk_debug;
use crate::trace::tags;
use crate::trace::Span;
use std::collections::HashMap;

enum Applies {
    TagPresent(&'static str),
    TagEquals(&'static str, &'static str),
}

struct Rule {
    applies: Applies,
    sources: &'static [&'static str],
    // Whether the generic network-destination sources may be consulted
    // when none of the rule's own sources is present.
    network_fallback: bool,
}

// Priority order, highest to lowest.
const RULES: &[Rule] = &[
    Rule {
        applies: Applies::TagPresent(tags::AWS_SERVICE),
        sources: &[
            tags::QUEUE_NAME,
            tags::TOPIC_NAME,
            tags::STREAM_NAME,
            tags::TABLE_NAME,
            tags::BUCKET_NAME,
        ],
        network_fallback: true,
    },
    Rule {
        applies: Applies::TagEquals(tags::DB_SYSTEM, tags::DB_SYSTEM_CASSANDRA),
        sources: &[tags::CASSANDRA_CONTACT_POINTS],
        network_fallback: false,
    },
    Rule {
        applies: Applies::TagPresent(tags::DB_SYSTEM),
        sources: &[tags::DB_NAME, tags::DB_INSTANCE],
        network_fallback: true,
    },
    Rule {
        applies: Applies::TagPresent(tags::MESSAGING_SYSTEM),
        sources: &[tags::KAFKA_BOOTSTRAP_SERVERS],
        network_fallback: true,
    },
    Rule {
        applies: Applies::TagPresent(tags::RPC_SYSTEM),
        sources: &[tags::RPC_SERVICE],
        network_fallback: true,
    },
];

// Last-resort sources for rules that allow the network fallback, and for
// outbound spans matching no rule at all.
const NETWORK_SOURCES: &[&str] = &[
    tags::NETWORK_DESTINATION_NAME,
    tags::PEER_HOSTNAME,
    tags::TARGET_HOST,
];

/// Set the `peer.service` tag and its provenance tags as applicable for
/// the given finishing span, then apply user remappings. A span for which
/// no source value can be found is left untouched; this is an expected
/// outcome.
pub(crate) fn set_peer_service(
    span: &Span,
    defaults_enabled: bool,
    mappings: &HashMap<String, String>,
) {
    let resolved = span.with_tags_mut(|meta| {
        if meta.contains_key(tags::PEER_SERVICE) {
            // Already set by the caller; record its provenance as itself.
            meta.insert(
                tags::KEY_PEER_SERVICE_SOURCE.to_string(),
                tags::PEER_SERVICE.to_string(),
            );
        } else {
            let span_kind = meta.get(tags::SPAN_KIND).map(String::as_str);
            let is_outbound = matches!(
                span_kind,
                Some(tags::SPAN_KIND_CLIENT) | Some(tags::SPAN_KIND_PRODUCER)
            );
            if !(is_outbound && defaults_enabled) {
                return false;
            }
            let Some(source) = resolve_from_sources(meta) else {
                return true;
            };
            meta.insert(tags::KEY_PEER_SERVICE_SOURCE.to_string(), source.to_string());
        }

        // Overwrite the resolved value if remapped by the user.
        if let Some(peer_service) = meta.get(tags::PEER_SERVICE).cloned() {
            if let Some(target) = mappings.get(&peer_service) {
                meta.insert(
                    tags::KEY_PEER_SERVICE_REMAPPED_FROM.to_string(),
                    peer_service,
                );
                meta.insert(tags::PEER_SERVICE.to_string(), target.clone());
            }
        }
        false
    });

    if resolved == Some(true) {
        tk_debug!(name: "peer_service_source_missing", span_name = span.name());
    }
}

/// Pick the `peer.service` value from the sources determined by the tags
/// on the span. Returns the source tag name used, or `None` when no
/// candidate source tag is present.
fn resolve_from_sources(meta: &mut HashMap<String, String>) -> Option<&'static str> {
    let matched = RULES.iter().find(|rule| match rule.applies {
        Applies::TagPresent(tag) => meta.contains_key(tag),
        Applies::TagEquals(tag, value) => meta.get(tag).map(String::as_str) == Some(value),
    });
    let (sources, network_fallback) = match matched {
        Some(rule) => (rule.sources, rule.network_fallback),
        None => (&[][..], true),
    };
    let candidates = sources
        .iter()
        .chain(network_fallback.then_some(NETWORK_SOURCES).into_iter().flatten());
    for &source in candidates {
        if let Some(value) = meta.get(source).cloned() {
            meta.insert(tags::PEER_SERVICE.to_string(), value);
            return Some(source);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound_span(kind: &str) -> Span {
        let span = Span::new("request", "svc", "res", 1, 1, 0, 0);
        span.set_tag(tags::SPAN_KIND, kind);
        span
    }

    #[test]
    fn existing_peer_service_records_provenance_and_skips_resolution() {
        let span = outbound_span(tags::SPAN_KIND_CLIENT);
        span.set_tag(tags::PEER_SERVICE, "payments");
        span.set_tag(tags::DB_NAME, "ignored");
        span.set_tag(tags::DB_SYSTEM, "postgres");

        set_peer_service(&span, true, &HashMap::new());

        assert_eq!(span.tag(tags::PEER_SERVICE).as_deref(), Some("payments"));
        assert_eq!(
            span.tag(tags::KEY_PEER_SERVICE_SOURCE).as_deref(),
            Some(tags::PEER_SERVICE)
        );
    }

    #[test]
    fn non_outbound_spans_are_left_untouched() {
        let span = outbound_span("server");
        span.set_tag(tags::DB_SYSTEM, "postgres");
        span.set_tag(tags::DB_NAME, "users");

        set_peer_service(&span, true, &HashMap::new());

        assert_eq!(span.tag(tags::PEER_SERVICE), None);
        assert_eq!(span.tag(tags::KEY_PEER_SERVICE_SOURCE), None);
    }

    #[test]
    fn disabled_defaults_skip_resolution() {
        let span = outbound_span(tags::SPAN_KIND_CLIENT);
        span.set_tag(tags::DB_SYSTEM, "postgres");
        span.set_tag(tags::DB_NAME, "users");

        set_peer_service(&span, false, &HashMap::new());

        assert_eq!(span.tag(tags::PEER_SERVICE), None);
    }

    #[test]
    fn cassandra_contact_points_win_without_network_fallback() {
        let span = outbound_span(tags::SPAN_KIND_CLIENT);
        span.set_tag(tags::DB_SYSTEM, tags::DB_SYSTEM_CASSANDRA);
        span.set_tag(tags::CASSANDRA_CONTACT_POINTS, "10.0.0.1,10.0.0.2");
        span.set_tag(tags::NETWORK_DESTINATION_NAME, "cass.internal");

        set_peer_service(&span, true, &HashMap::new());

        assert_eq!(
            span.tag(tags::PEER_SERVICE).as_deref(),
            Some("10.0.0.1,10.0.0.2")
        );
        assert_eq!(
            span.tag(tags::KEY_PEER_SERVICE_SOURCE).as_deref(),
            Some(tags::CASSANDRA_CONTACT_POINTS)
        );
    }

    #[test]
    fn cassandra_without_contact_points_resolves_nothing() {
        // The cassandra rule opts out of the network fallback even when
        // network destination tags are present.
        let span = outbound_span(tags::SPAN_KIND_CLIENT);
        span.set_tag(tags::DB_SYSTEM, tags::DB_SYSTEM_CASSANDRA);
        span.set_tag(tags::NETWORK_DESTINATION_NAME, "cass.internal");

        set_peer_service(&span, true, &HashMap::new());

        assert_eq!(span.tag(tags::PEER_SERVICE), None);
        assert_eq!(span.tag(tags::KEY_PEER_SERVICE_SOURCE), None);
    }

    #[test]
    fn aws_sources_take_priority_over_db() {
        let span = outbound_span(tags::SPAN_KIND_PRODUCER);
        span.set_tag(tags::AWS_SERVICE, "sqs");
        span.set_tag(tags::QUEUE_NAME, "orders");
        span.set_tag(tags::DB_SYSTEM, "postgres");
        span.set_tag(tags::DB_NAME, "users");

        set_peer_service(&span, true, &HashMap::new());

        assert_eq!(span.tag(tags::PEER_SERVICE).as_deref(), Some("orders"));
        assert_eq!(
            span.tag(tags::KEY_PEER_SERVICE_SOURCE).as_deref(),
            Some(tags::QUEUE_NAME)
        );
    }

    #[test]
    fn db_rule_prefers_db_name_over_instance() {
        let span = outbound_span(tags::SPAN_KIND_CLIENT);
        span.set_tag(tags::DB_SYSTEM, "postgres");
        span.set_tag(tags::DB_NAME, "users");
        span.set_tag(tags::DB_INSTANCE, "users-replica-2");

        set_peer_service(&span, true, &HashMap::new());

        assert_eq!(span.tag(tags::PEER_SERVICE).as_deref(), Some("users"));
        assert_eq!(
            span.tag(tags::KEY_PEER_SERVICE_SOURCE).as_deref(),
            Some(tags::DB_NAME)
        );
    }

    #[test]
    fn network_fallback_applies_when_rule_sources_missing() {
        let span = outbound_span(tags::SPAN_KIND_CLIENT);
        span.set_tag(tags::RPC_SYSTEM, "grpc");
        span.set_tag(tags::PEER_HOSTNAME, "rpc.internal");

        set_peer_service(&span, true, &HashMap::new());

        assert_eq!(span.tag(tags::PEER_SERVICE).as_deref(), Some("rpc.internal"));
        assert_eq!(
            span.tag(tags::KEY_PEER_SERVICE_SOURCE).as_deref(),
            Some(tags::PEER_HOSTNAME)
        );
    }

    #[test]
    fn plain_outbound_span_uses_network_sources() {
        let span = outbound_span(tags::SPAN_KIND_CLIENT);
        span.set_tag(tags::TARGET_HOST, "10.4.2.1");

        set_peer_service(&span, true, &HashMap::new());

        assert_eq!(span.tag(tags::PEER_SERVICE).as_deref(), Some("10.4.2.1"));
        assert_eq!(
            span.tag(tags::KEY_PEER_SERVICE_SOURCE).as_deref(),
            Some(tags::TARGET_HOST)
        );
    }

    #[test]
    fn no_candidate_source_is_a_silent_miss() {
        let span = outbound_span(tags::SPAN_KIND_CLIENT);

        set_peer_service(&span, true, &HashMap::new());

        assert_eq!(span.tag(tags::PEER_SERVICE), None);
        assert_eq!(span.tag(tags::KEY_PEER_SERVICE_SOURCE), None);
    }

    #[test]
    fn remapping_overwrites_value_and_records_original() {
        let span = outbound_span(tags::SPAN_KIND_CLIENT);
        span.set_tag(tags::DB_SYSTEM, "postgres");
        span.set_tag(tags::DB_NAME, "users-legacy");
        let mappings =
            HashMap::from([("users-legacy".to_string(), "users".to_string())]);

        set_peer_service(&span, true, &mappings);

        assert_eq!(span.tag(tags::PEER_SERVICE).as_deref(), Some("users"));
        assert_eq!(
            span.tag(tags::KEY_PEER_SERVICE_REMAPPED_FROM).as_deref(),
            Some("users-legacy")
        );
        assert_eq!(
            span.tag(tags::KEY_PEER_SERVICE_SOURCE).as_deref(),
            Some(tags::DB_NAME)
        );
    }

    #[test]
    fn remapping_applies_to_pre_set_peer_service() {
        let span = outbound_span(tags::SPAN_KIND_CLIENT);
        span.set_tag(tags::PEER_SERVICE, "old-name");
        let mappings = HashMap::from([("old-name".to_string(), "new-name".to_string())]);

        set_peer_service(&span, true, &mappings);

        assert_eq!(span.tag(tags::PEER_SERVICE).as_deref(), Some("new-name"));
        assert_eq!(
            span.tag(tags::KEY_PEER_SERVICE_REMAPPED_FROM).as_deref(),
            Some("old-name")
        );
    }
}
