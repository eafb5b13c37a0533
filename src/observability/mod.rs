// Observability: metrics counters per pipeline phase

pub mod metrics;
