//! Reading a batch job's status object

use calrissian_core::JobStatus;
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::Job;

/// Map the counters of a job status onto [`JobStatus`]. A job without status
/// has not been scheduled yet and counts as active.
pub fn classify(job: &Job) -> JobStatus {
    let Some(status) = job.status.as_ref() else {
        return JobStatus::Active;
    };
    let positive = |count: Option<i32>| count.unwrap_or(0) > 0;

    if positive(status.active) {
        JobStatus::Active
    } else if positive(status.succeeded) {
        JobStatus::Succeeded
    } else if positive(status.failed) {
        JobStatus::Failed
    } else {
        JobStatus::Active
    }
}

pub fn start_time(job: &Job) -> Option<DateTime<Utc>> {
    job.status.as_ref()?.start_time.as_ref().map(|time| time.0)
}

/// Explicit completion time, else the most recent condition transition
pub fn completion_time(job: &Job) -> Option<DateTime<Utc>> {
    let status = job.status.as_ref()?;
    if let Some(time) = &status.completion_time {
        return Some(time.0);
    }
    status
        .conditions
        .as_ref()?
        .iter()
        .filter_map(|condition| condition.last_transition_time.as_ref().map(|time| time.0))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus as K8sJobStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn job(status: Option<K8sJobStatus>) -> Job {
        Job {
            status,
            ..Default::default()
        }
    }

    fn at(hour: u32) -> Time {
        Time(Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap())
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify(&job(None)), JobStatus::Active);
        assert_eq!(
            classify(&job(Some(K8sJobStatus::default()))),
            JobStatus::Active
        );
        assert_eq!(
            classify(&job(Some(K8sJobStatus {
                succeeded: Some(1),
                ..Default::default()
            }))),
            JobStatus::Succeeded
        );
        assert_eq!(
            classify(&job(Some(K8sJobStatus {
                failed: Some(1),
                ..Default::default()
            }))),
            JobStatus::Failed
        );
        // A retrying job still has an active pod after a failure
        assert_eq!(
            classify(&job(Some(K8sJobStatus {
                active: Some(1),
                failed: Some(1),
                ..Default::default()
            }))),
            JobStatus::Active
        );
    }

    #[test]
    fn test_times() {
        assert_eq!(start_time(&job(None)), None);
        assert_eq!(completion_time(&job(None)), None);

        let finished = job(Some(K8sJobStatus {
            start_time: Some(at(8)),
            completion_time: Some(at(9)),
            ..Default::default()
        }));
        assert_eq!(start_time(&finished), Some(at(8).0));
        assert_eq!(completion_time(&finished), Some(at(9).0));
    }

    #[test]
    fn test_completion_time_falls_back_to_conditions() {
        let failed = job(Some(K8sJobStatus {
            failed: Some(1),
            conditions: Some(vec![
                JobCondition {
                    type_: "FailureTarget".to_string(),
                    status: "True".to_string(),
                    last_transition_time: Some(at(10)),
                    ..Default::default()
                },
                JobCondition {
                    type_: "Failed".to_string(),
                    status: "True".to_string(),
                    last_transition_time: Some(at(11)),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }));
        assert_eq!(completion_time(&failed), Some(at(11).0));
    }
}
