use std::fmt::Write;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use chrono::Utc;

use m3u_core::{ChannelStatus, CheckReport};

use crate::state::AppState;

const STATUSES: [ChannelStatus; 3] = [
    ChannelStatus::Alive,
    ChannelStatus::Unstable,
    ChannelStatus::Dead,
];

fn status_label(status: ChannelStatus) -> &'static str {
    match status {
        ChannelStatus::Alive => "alive",
        ChannelStatus::Unstable => "unstable",
        ChannelStatus::Dead => "dead",
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let runs: Vec<Arc<CheckReport>> = state
        .runs
        .iter()
        .map(|e| Arc::clone(e.value()))
        .collect();

    (
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        render(&runs),
    )
}

pub fn render(runs: &[Arc<CheckReport>]) -> String {
    let mut out = String::with_capacity(1024 + runs.len() * 512);

    let _ = writeln!(out, "# TYPE m3u_health_runs gauge");
    let _ = writeln!(out, "# HELP m3u_health_runs Number of completed check runs kept in memory");
    let _ = writeln!(out, "m3u_health_runs {}", runs.len());

    let _ = writeln!(out, "# TYPE m3u_health_channels gauge");
    let _ = writeln!(out, "# HELP m3u_health_channels Channels per final status in each run");
    for r in runs {
        for status in STATUSES {
            let _ = writeln!(
                out,
                "m3u_health_channels{{run_id=\"{}\",status=\"{}\"}} {}",
                r.id,
                status_label(status),
                r.count(status)
            );
        }
    }

    let _ = writeln!(out, "# TYPE m3u_health_channels_recovered gauge");
    let _ = writeln!(
        out,
        "# HELP m3u_health_channels_recovered Unstable channels that passed their retest"
    );
    for r in runs {
        let _ = writeln!(
            out,
            "m3u_health_channels_recovered{{run_id=\"{}\"}} {}",
            r.id,
            r.retested_recovered().count()
        );
    }

    let _ = writeln!(out, "# TYPE m3u_health_run_duration_seconds gauge");
    let _ = writeln!(out, "# HELP m3u_health_run_duration_seconds Wall-clock duration of each run");
    for r in runs {
        let _ = writeln!(
            out,
            "m3u_health_run_duration_seconds{{run_id=\"{}\"}} {:.3}",
            r.id,
            r.duration_secs()
        );
    }

    let _ = writeln!(out, "# TYPE m3u_health_final_timeout_seconds gauge");
    let _ = writeln!(
        out,
        "# HELP m3u_health_final_timeout_seconds Adaptive probe timeout at the end of each run"
    );
    for r in runs {
        let _ = writeln!(
            out,
            "m3u_health_final_timeout_seconds{{run_id=\"{}\"}} {:.3}",
            r.id, r.final_timeout_secs
        );
    }

    let _ = writeln!(out, "# TYPE m3u_health_run_age_seconds gauge");
    let _ = writeln!(out, "# HELP m3u_health_run_age_seconds Time since each run finished");
    let now = Utc::now();
    for r in runs {
        let age = (now - r.finished_at).num_milliseconds() as f64 / 1000.0;
        let _ = writeln!(out, "m3u_health_run_age_seconds{{run_id=\"{}\"}} {:.3}", r.id, age);
    }

    let _ = writeln!(out, "# EOF");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use m3u_core::{Channel, ChannelResult};
    use uuid::Uuid;

    #[test]
    fn renders_counts_per_status() {
        let report = CheckReport {
            id: Uuid::nil(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            results: vec![
                ChannelResult::from_counts(Channel::new(1, "a", "http://a"), 10, 10, 0.7),
                ChannelResult::from_counts(Channel::new(2, "b", "http://b"), 10, 0, 0.7),
                ChannelResult::from_counts(Channel::new(3, "c", "http://c"), 10, 0, 0.7),
            ],
            batches: 1,
            final_timeout_secs: 4.5,
        };
        let text = render(&[Arc::new(report)]);
        let id = Uuid::nil();
        assert!(text.contains("m3u_health_runs 1"));
        assert!(text.contains(&format!("m3u_health_channels{{run_id=\"{}\",status=\"alive\"}} 1", id)));
        assert!(text.contains(&format!("m3u_health_channels{{run_id=\"{}\",status=\"dead\"}} 2", id)));
        assert!(text.contains(&format!(
            "m3u_health_final_timeout_seconds{{run_id=\"{}\"}} 4.500",
            id
        )));
        assert!(text.ends_with("# EOF\n"));
    }
}
