use biometrics::{Collector, Counter, Moments};

pub(crate) static TRANSPORT_REQUESTS: Counter = Counter::new("wafprobe.transport.requests");
pub(crate) static TRANSPORT_FAILURES: Counter = Counter::new("wafprobe.transport.failures");
pub(crate) static TRANSPORT_HTTP_ERRORS: Counter = Counter::new("wafprobe.transport.http_errors");

pub(crate) static SESSIONS_STARTED: Counter = Counter::new("wafprobe.session.started");
pub(crate) static SESSIONS_DISCONNECTED: Counter = Counter::new("wafprobe.session.disconnected");
pub(crate) static MESSAGES_SENT: Counter = Counter::new("wafprobe.session.messages_sent");
pub(crate) static MESSAGES_BLOCKED: Counter = Counter::new("wafprobe.session.messages_blocked");
pub(crate) static REFRESHES: Counter = Counter::new("wafprobe.session.refreshes");

pub(crate) static TURNS: Counter = Counter::new("wafprobe.orchestrator.turns");
pub(crate) static FAILED_TURNS: Counter = Counter::new("wafprobe.orchestrator.failed_turns");
pub(crate) static TURN_DURATION: Moments =
    Moments::new("wafprobe.orchestrator.turn_duration_seconds");

pub(crate) static GENERATIONS: Counter = Counter::new("wafprobe.generate.requests");
pub(crate) static GENERATION_ERRORS: Counter = Counter::new("wafprobe.generate.errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&TRANSPORT_REQUESTS);
    collector.register_counter(&TRANSPORT_FAILURES);
    collector.register_counter(&TRANSPORT_HTTP_ERRORS);

    collector.register_counter(&SESSIONS_STARTED);
    collector.register_counter(&SESSIONS_DISCONNECTED);
    collector.register_counter(&MESSAGES_SENT);
    collector.register_counter(&MESSAGES_BLOCKED);
    collector.register_counter(&REFRESHES);

    collector.register_counter(&TURNS);
    collector.register_counter(&FAILED_TURNS);
    collector.register_moments(&TURN_DURATION);

    collector.register_counter(&GENERATIONS);
    collector.register_counter(&GENERATION_ERRORS);
}
