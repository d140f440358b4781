use crate::config::ConfigError;
use crate::identity::IdentityError;
use crate::notifications::NotificationError;
use crate::seed::SeedError;
use crate::telemetry::TelemetryError;
use crate::tickets::{ExportError, TicketServiceError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Seed(SeedError),
    Identity(IdentityError),
    Tickets(TicketServiceError),
    Export(ExportError),
    Notification(NotificationError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Seed(err) => write!(f, "seed error: {}", err),
            AppError::Identity(err) => write!(f, "identity error: {}", err),
            AppError::Tickets(err) => write!(f, "ticket error: {}", err),
            AppError::Export(err) => write!(f, "export error: {}", err),
            AppError::Notification(err) => write!(f, "notification error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Seed(err) => Some(err),
            AppError::Identity(err) => Some(err),
            AppError::Tickets(err) => Some(err),
            AppError::Export(err) => Some(err),
            AppError::Notification(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Tickets(TicketServiceError::Validation(_))
            | AppError::Identity(IdentityError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Tickets(TicketServiceError::NotAuthorized) => StatusCode::FORBIDDEN,
            AppError::Tickets(TicketServiceError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Identity(IdentityError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Seed(_)
            | AppError::Identity(_)
            | AppError::Tickets(_)
            | AppError::Export(_)
            | AppError::Notification(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<SeedError> for AppError {
    fn from(value: SeedError) -> Self {
        Self::Seed(value)
    }
}

impl From<IdentityError> for AppError {
    fn from(value: IdentityError) -> Self {
        Self::Identity(value)
    }
}

impl From<TicketServiceError> for AppError {
    fn from(value: TicketServiceError) -> Self {
        Self::Tickets(value)
    }
}

impl From<ExportError> for AppError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

impl From<NotificationError> for AppError {
    fn from(value: NotificationError) -> Self {
        Self::Notification(value)
    }
}
