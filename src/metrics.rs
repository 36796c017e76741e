use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
    exponential_buckets,
};

/// Outcome label value that makes a query eligible for the duration histogram.
const STATUS_SUCCESS: &str = "success";

/// The fixed metric catalog for the process, built once at startup and shared
/// by reference between the ingestion pipeline (writers) and the exposition
/// server (reader). The instruments are internally atomic, so any number of
/// concurrent recorders can call in without coordination.
pub struct Metrics {
    registry: Registry,
    up: IntGauge,
    sql_queries_total: IntCounterVec,
    sql_query_duration_seconds: HistogramVec,
    recorder_dumps_processed_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Metrics, prometheus::Error> {
        let registry = Registry::new();

        let up = IntGauge::new(
            "frapp8s_up",
            "Indicates if the frapp8s exporter is running (1 for up, 0 for down)",
        )?;

        let sql_queries_total = IntCounterVec::new(
            Opts::new(
                "frappe_sql_queries_total",
                "Total number of SQL queries executed, categorized by bench, site, doctype, method, and SQL type.",
            ),
            &["bench", "site", "doctype", "method", "sql_type", "status"],
        )?;

        // Exponential doubling from 1ms spans sub-millisecond to multi-second
        // OLTP query latency in 15 buckets (~1ms..16s).
        let sql_query_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "frappe_sql_query_duration_seconds",
                "Histogram of SQL query execution durations in seconds.",
            )
            .buckets(exponential_buckets(0.001, 2.0, 15)?),
            &["bench", "site", "doctype", "method", "sql_type"],
        )?;

        let recorder_dumps_processed_total = IntCounterVec::new(
            Opts::new(
                "frapp8s_recorder_dumps_processed_total",
                "Total number of Frappe Recorder dump files processed.",
            ),
            &["bench", "status"],
        )?;

        registry.register(Box::new(up.clone()))?;
        registry.register(Box::new(sql_queries_total.clone()))?;
        registry.register(Box::new(sql_query_duration_seconds.clone()))?;
        registry.register(Box::new(recorder_dumps_processed_total.clone()))?;

        Ok(Metrics {
            registry,
            up,
            sql_queries_total,
            sql_query_duration_seconds,
            recorder_dumps_processed_total,
        })
    }

    /// Record one parsed SQL query. The counter always increments; the
    /// duration histogram only observes successful queries with a sane
    /// duration. A negative duration on a success is tolerated as malformed
    /// upstream timing data and skips the histogram silently.
    pub fn record_query(
        &self,
        bench: &str,
        site: &str,
        doctype: &str,
        method: &str,
        sql_type: &str,
        status: &str,
        duration_seconds: f64,
    ) {
        self.sql_queries_total
            .with_label_values(&[bench, site, doctype, method, sql_type, status])
            .inc();

        if status == STATUS_SUCCESS && duration_seconds >= 0.0 {
            self.sql_query_duration_seconds
                .with_label_values(&[bench, site, doctype, method, sql_type])
                .observe(duration_seconds);
        }
    }

    /// Record that one recorder dump file has been processed. Expected status
    /// values are "success", "error_read" and "error_parse", but any string
    /// is accepted as a label value.
    pub fn inc_recorder_dumps_processed(&self, bench: &str, status: &str) {
        self.recorder_dumps_processed_total
            .with_label_values(&[bench, status])
            .inc();
    }

    /// Flip the exporter liveness gauge.
    pub fn set_serving(&self, serving: bool) {
        self.up.set(if serving { 1 } else { 0 });
    }

    /// Render the current registry state in the Prometheus text exposition
    /// format, as served on each scrape.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const LABELS: [&str; 5] = ["bench-1", "site1.local", "Sales Order", "save", "SELECT"];

    fn query_count(m: &Metrics, status: &str) -> u64 {
        m.sql_queries_total
            .with_label_values(&[LABELS[0], LABELS[1], LABELS[2], LABELS[3], LABELS[4], status])
            .get()
    }

    fn histogram_sample_count(m: &Metrics) -> u64 {
        m.sql_query_duration_seconds
            .with_label_values(&LABELS)
            .get_sample_count()
    }

    #[test]
    fn test_successful_query_hits_counter_and_histogram() {
        let m = Metrics::new().unwrap();

        m.record_query("bench-1", "site1.local", "Sales Order", "save", "SELECT", "success", 0.5);

        assert_eq!(query_count(&m, "success"), 1);
        assert_eq!(histogram_sample_count(&m), 1);
        let sum = m
            .sql_query_duration_seconds
            .with_label_values(&LABELS)
            .get_sample_sum();
        assert!((sum - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failed_query_hits_counter_only() {
        let m = Metrics::new().unwrap();

        m.record_query("bench-1", "site1.local", "Sales Order", "save", "SELECT", "error", 0.5);

        assert_eq!(query_count(&m, "error"), 1);
        assert_eq!(histogram_sample_count(&m), 0);
    }

    #[test]
    fn test_negative_duration_on_success_skips_histogram() {
        let m = Metrics::new().unwrap();

        m.record_query("bench-1", "site1.local", "Sales Order", "save", "SELECT", "success", -1.0);

        assert_eq!(query_count(&m, "success"), 1);
        assert_eq!(histogram_sample_count(&m), 0);
    }

    #[test]
    fn test_recorder_dumps_counter() {
        let m = Metrics::new().unwrap();

        m.inc_recorder_dumps_processed("bench-1", "success");
        m.inc_recorder_dumps_processed("bench-1", "success");
        m.inc_recorder_dumps_processed("bench-1", "error_parse");

        let count = |status: &str| {
            m.recorder_dumps_processed_total
                .with_label_values(&["bench-1", status])
                .get()
        };
        assert_eq!(count("success"), 2);
        assert_eq!(count("error_parse"), 1);
        assert_eq!(count("error_read"), 0);
    }

    #[test]
    fn test_concurrent_recording_loses_no_updates() {
        let m = Arc::new(Metrics::new().unwrap());
        let threads = 8;
        let per_thread = 1_000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let m = Arc::clone(&m);
                std::thread::spawn(move || {
                    for _ in 0..per_thread {
                        m.record_query(
                            "bench-1",
                            "site1.local",
                            "Sales Order",
                            "save",
                            "SELECT",
                            "success",
                            0.002,
                        );
                        m.inc_recorder_dumps_processed("bench-1", "success");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = (threads * per_thread) as u64;
        assert_eq!(query_count(&m, "success"), total);
        assert_eq!(histogram_sample_count(&m), total);
        assert_eq!(
            m.recorder_dumps_processed_total
                .with_label_values(&["bench-1", "success"])
                .get(),
            total
        );
    }

    #[test]
    fn test_render_exposes_the_full_catalog() {
        let m = Metrics::new().unwrap();
        m.set_serving(true);
        m.record_query("bench-1", "site1.local", "ToDo", "save", "INSERT", "success", 0.01);
        m.inc_recorder_dumps_processed("bench-1", "success");

        let body = m.render().unwrap();
        assert!(body.contains("frapp8s_up 1"));
        assert!(body.contains("frappe_sql_queries_total"));
        assert!(body.contains("frappe_sql_query_duration_seconds"));
        assert!(body.contains("frapp8s_recorder_dumps_processed_total"));
        assert!(body.contains("sql_type=\"INSERT\""));

        m.set_serving(false);
        assert!(m.render().unwrap().contains("frapp8s_up 0"));
    }
}
