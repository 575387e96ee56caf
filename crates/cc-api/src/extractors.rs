//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs, helpers that turn body
//! and query rejections into [`ApiError::UnprocessableEntity`], and the
//! shared pagination query.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;
use cc_store::{Pagination, DEFAULT_PER_PAGE, MAX_PER_PAGE};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::ApiError;

/// Request types that check rules serde cannot express.
pub trait Validate {
    /// Returns an error message on failure.
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to 422.
///
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., ApiError> {
///     let req = extract_json(body)?;
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| ApiError::UnprocessableEntity(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, ApiError> {
    let value = extract_json(result)?;
    value.validate().map_err(ApiError::UnprocessableEntity)?;
    Ok(value)
}

/// Extract query parameters, mapping parse errors to 422.
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| ApiError::UnprocessableEntity(err.body_text()))
}

/// `page` / `per_page` query parameters.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// One-based page number (default 1).
    pub page: Option<u32>,
    /// Results per page, 1 to 5000 (default 50).
    pub per_page: Option<u32>,
}

impl PageQuery {
    pub fn pagination(&self) -> Result<Pagination, ApiError> {
        let page = self.page.unwrap_or(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE);
        if page == 0 {
            return Err(ApiError::UnprocessableEntity(
                "Page must be greater than 0".into(),
            ));
        }
        if per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(ApiError::UnprocessableEntity(format!(
                "Per page must be between 1 and {MAX_PER_PAGE}"
            )));
        }
        Ok(Pagination::new(page, per_page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults() {
        let pagination = PageQuery::default().pagination().unwrap();
        assert_eq!(pagination, Pagination::new(1, 50));
    }

    #[test]
    fn pagination_rejects_out_of_range() {
        let zero_page = PageQuery {
            page: Some(0),
            per_page: None,
        };
        assert!(matches!(
            zero_page.pagination(),
            Err(ApiError::UnprocessableEntity(_))
        ));
        let huge = PageQuery {
            page: None,
            per_page: Some(5001),
        };
        assert!(huge.pagination().is_err());
        let max = PageQuery {
            page: Some(2),
            per_page: Some(5000),
        };
        assert_eq!(max.pagination().unwrap(), Pagination::new(2, 5000));
    }

    struct NonEmpty(String);

    impl Validate for NonEmpty {
        fn validate(&self) -> Result<(), String> {
            if self.0.is_empty() {
                Err("must not be empty".into())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn validated_json_runs_rules() {
        let ok = extract_validated_json(Ok(Json(NonEmpty("x".into()))));
        assert!(ok.is_ok());
        let err = extract_validated_json(Ok(Json(NonEmpty(String::new())))).err().unwrap();
        assert_eq!(err.to_string(), "must not be empty");
    }
}
