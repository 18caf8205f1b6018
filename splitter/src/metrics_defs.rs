//! Metrics definitions for the splitter.

use shared::metrics_defs::{MetricDef, MetricType};

pub const RUN_REQUESTS: MetricDef = MetricDef {
    name: "run.requests",
    metric_type: MetricType::Counter,
    description: "Number of processing runs started",
};

pub const RUN_FAILURES: MetricDef = MetricDef {
    name: "run.failures",
    metric_type: MetricType::Counter,
    description: "Number of processing runs that returned an error",
};

pub const RUN_DURATION: MetricDef = MetricDef {
    name: "run.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a processing run in seconds",
};

pub const SOURCE_ROWS: MetricDef = MetricDef {
    name: "source.rows",
    metric_type: MetricType::Histogram,
    description: "Number of data rows read from the source worksheet",
};

pub const ROWS_WRITTEN: MetricDef = MetricDef {
    name: "destination.rows_written",
    metric_type: MetricType::Counter,
    description: "Number of data rows written to destination worksheets",
};

pub const WORKSHEETS_CREATED: MetricDef = MetricDef {
    name: "destination.worksheets_created",
    metric_type: MetricType::Counter,
    description: "Number of destination worksheets created on demand",
};

pub const ALL_METRICS: &[MetricDef] = &[
    RUN_REQUESTS,
    RUN_FAILURES,
    RUN_DURATION,
    SOURCE_ROWS,
    ROWS_WRITTEN,
    WORKSHEETS_CREATED,
];
