use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::jobs::repo::{Job, JobFields};

time::serde::format_description!(date_format, Date, "[year]-[month]-[day]");

#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    #[serde(default, with = "date_format::option")]
    pub start_date: Option<Date>,
    #[serde(default, with = "date_format::option")]
    pub end_date: Option<Date>,
    pub description: Option<String>,
}

impl From<JobRequest> for JobFields {
    fn from(r: JobRequest) -> Self {
        Self {
            title: r.title.trim().to_string(),
            company: r.company.trim().to_string(),
            location: r.location,
            start_date: r.start_date,
            end_date: r.end_date,
            description: r.description,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    #[serde(with = "date_format::option")]
    pub start_date: Option<Date>,
    #[serde(with = "date_format::option")]
    pub end_date: Option<Date>,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
}

impl From<Job> for JobResponse {
    fn from(j: Job) -> Self {
        Self {
            id: j.id,
            title: j.title,
            company: j.company,
            location: j.location,
            start_date: j.start_date,
            end_date: j.end_date,
            description: j.description,
            created_at: j.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn job_request_parses_iso_dates() {
        let req: JobRequest = serde_json::from_str(
            r#"{
                "title": "Backend Engineer",
                "company": "Acme",
                "start_date": "2022-03-01",
                "end_date": "2024-11-30"
            }"#,
        )
        .expect("parse");
        assert_eq!(req.start_date, Some(date!(2022 - 03 - 01)));
        assert_eq!(req.end_date, Some(date!(2024 - 11 - 30)));
        assert!(req.location.is_none());
    }

    #[test]
    fn job_response_serializes_iso_dates() {
        let response = JobResponse {
            id: Uuid::new_v4(),
            title: "Backend Engineer".into(),
            company: "Acme".into(),
            location: None,
            start_date: Some(date!(2022 - 03 - 01)),
            end_date: None,
            description: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&response).expect("serialize");
        assert_eq!(json["start_date"], "2022-03-01");
        assert_eq!(json["end_date"], serde_json::Value::Null);
    }

    #[test]
    fn pagination_defaults() {
        let p: Pagination = serde_json::from_str("{}").expect("parse");
        assert_eq!(p.limit, 20);
        assert_eq!(p.offset, 0);
    }
}
