//! Request extractors: caller address, admin identity and multipart forms.

use crate::{api::responses::ApiError, core::bills::BillUpload, errors::Error};
use axum::{
    extract::{ConnectInfo, FromRequestParts, Multipart},
    http::{HeaderMap, request::Parts},
};
use std::{collections::HashMap, convert::Infallible, net::SocketAddr};

/// Header the upstream authentication layer sets for admin sessions.
pub const ADMIN_HEADER: &str = "x-admin-identity";

/// Multipart field carrying the bill file.
pub const BILL_FIELD: &str = "billFile";

/// Caller address: first `x-forwarded-for` hop, else the socket peer, else `unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string);
        let peer = || {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        };
        Ok(Self(
            forwarded
                .or_else(peer)
                .unwrap_or_else(|| "unknown".to_string()),
        ))
    }
}

fn admin_identity(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ADMIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Authenticated admin; requests without the identity header get 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCaller(pub String);

impl<S> FromRequestParts<S> for AdminCaller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        admin_identity(&parts.headers)
            .map(Self)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Admin identity if present; public routes use it to skip rate limiting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaybeAdmin(pub Option<String>);

impl<S> FromRequestParts<S> for MaybeAdmin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(admin_identity(&parts.headers)))
    }
}

/// `User-Agent` header, if any.
pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Text fields and the optional bill file of a multipart form.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    /// The `billFile` part, if one with content was sent
    pub bill: Option<BillUpload>,
}

impl FormData {
    /// Reads every part of `multipart`.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(ToString::to_string) else {
                continue;
            };
            if name == BILL_FIELD {
                let original_name = field.file_name().unwrap_or("bill").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    form.bill = Some(BillUpload {
                        original_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// Text value of `name`, empty when absent.
    pub fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    /// Trimmed non-empty value of `name`.
    pub fn optional(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(String::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
    }

    /// Parses `name` as a whole number of months.
    pub fn months(&self, name: &str) -> Result<Option<i64>, Error> {
        self.optional(name)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| Error::validation(format!("{name} must be a whole number")))
            })
            .transpose()
    }
}
