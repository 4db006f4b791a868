//! Request classification.

use reqwest::{Method, Url};

use crate::http::Request;

/// The class of an intercepted GET request. Each class maps to exactly one
/// response strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    /// Top-level document load or refresh.
    Navigation,
    /// Sub-resource on the layer's own origin.
    SameOrigin,
    /// Sub-resource on any other origin.
    CrossOrigin,
}

/// Classifies `request` relative to the layer's own `origin`.
///
/// Returns `None` for non-GET requests, which are left to the host's default
/// handling. Navigation wins over origin checks.
#[must_use]
pub fn classify(request: &Request, origin: &Url) -> Option<RequestClass> {
    if request.method != Method::GET {
        return None;
    }
    if request.is_navigation() {
        return Some(RequestClass::Navigation);
    }
    if request.url.origin() == origin.origin() {
        Some(RequestClass::SameOrigin)
    } else {
        Some(RequestClass::CrossOrigin)
    }
}
