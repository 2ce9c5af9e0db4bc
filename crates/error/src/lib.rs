use actix_web::{HttpResponse, ResponseError, http::header::CONTENT_TYPE};
use failure::Fail;
use log::error;
use newsdesk_macros::From;
use std::borrow::Cow;

pub use actix_web::http::StatusCode;
pub use newsdesk_macros::ApiError;

/// Name of the response header carrying [`ApiError::code`].
pub const ERROR_CODE_HEADER: &str = "x-error-code";

/// Content type of all error responses.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// An error that occurred while handling an API request.
pub trait ApiError: Fail {
    /// HTTP response status code.
    fn status(&self) -> StatusCode;

    /// Internal code describing this error.
    ///
    /// This code is used to identify this error outside the system, and thus
    /// should only be present for errors which are intended to be reported
    /// to the user in detail.
    fn code(&self) -> Option<Cow<str>>;
}

/// This implementation is required to make `#[cause]` on a `Box<dyn ApiError>`
/// work.
impl Fail for Box<dyn ApiError> {
    fn name(&self) -> Option<&str> {
        (**self).name()
    }

    fn cause(&self) -> Option<&dyn Fail> {
        (**self).cause()
    }

    fn backtrace(&self) -> Option<&failure::Backtrace> {
        (**self).backtrace()
    }
}

/// A wrapper around user-facing [`ApiError`]s and errors which should not be
/// reported to the user in detail.
#[derive(Debug, Fail, From)]
pub enum Error {
    #[fail(display = "{}", _0)]
    Api(#[cause] Box<dyn ApiError>),
    /// Generic system error.
    #[fail(display = "{}", _0)]
    System(#[cause] #[from] std::io::Error),
    /// Error (de)serializing a document.
    #[fail(display = "{}", _0)]
    Json(#[cause] #[from] serde_json::Error),
    /// Error reading message payload.
    #[fail(display = "{}", _0)]
    Payload(#[from] actix_web::error::PayloadError),
}

impl<T: ApiError> From<T> for Error {
    fn from(error: T) -> Error {
        Error::Api(Box::new(error))
    }
}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        match self {
            Error::Api(err) => {
                let status = err.status();

                if status.is_server_error() {
                    error!("{}", err);
                }

                let mut rsp = HttpResponse::build(status);
                rsp.header(CONTENT_TYPE, TEXT_PLAIN);

                if let Some(code) = err.code() {
                    rsp.header(ERROR_CODE_HEADER, code.as_ref());
                }

                rsp.body(err.to_string())
            }
            Error::Payload(e) => e.error_response(),
            _ => {
                error!("{}", self);
                HttpResponse::InternalServerError()
                    .header(CONTENT_TYPE, TEXT_PLAIN)
                    .body("internal server error")
            }
        }
    }

    fn render_response(&self) -> HttpResponse {
        self.error_response()
    }
}
