//! Severity-driven toast presentation.

use crate::models::{Notification, Severity};
use std::time::Duration;

const LONG_TOAST: Duration = Duration::from_secs(10);
const SHORT_TOAST: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastPosition {
    TopRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToastStyle {
    /// CSS background for the toast body
    pub background: &'static str,
    pub icon: &'static str,
}

pub const CRITICAL_STYLE: ToastStyle = ToastStyle {
    background: "linear-gradient(135deg, #dc2626 0%, #991b1b 100%)",
    icon: "🚨",
};

pub const WARNING_STYLE: ToastStyle = ToastStyle {
    background: "linear-gradient(135deg, #f59e0b 0%, #b45309 100%)",
    icon: "⚠️",
};

pub const SUCCESS_STYLE: ToastStyle = ToastStyle {
    background: "linear-gradient(135deg, #10b981 0%, #047857 100%)",
    icon: "✅",
};

pub const INFO_STYLE: ToastStyle = ToastStyle {
    background: "linear-gradient(135deg, #3b82f6 0%, #1d4ed8 100%)",
    icon: "ℹ️",
};

/// Transient on-screen notice for a freshly received alert
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub notification_id: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub duration: Duration,
    pub style: ToastStyle,
    pub position: ToastPosition,
}

pub fn toast_duration(severity: Severity) -> Duration {
    match severity {
        Severity::Critical | Severity::Urgent => LONG_TOAST,
        Severity::Warning | Severity::Success | Severity::Info | Severity::Unknown => SHORT_TOAST,
    }
}

pub fn toast_style(severity: Severity) -> ToastStyle {
    match severity {
        Severity::Critical => CRITICAL_STYLE,
        Severity::Urgent | Severity::Warning => WARNING_STYLE,
        Severity::Success => SUCCESS_STYLE,
        Severity::Info | Severity::Unknown => INFO_STYLE,
    }
}

pub fn present(notification: &Notification) -> Toast {
    let severity = notification.alert.severity;

    Toast {
        notification_id: notification.id.clone(),
        severity,
        title: notification.alert.title.clone(),
        message: notification.alert.message.clone(),
        duration: toast_duration(severity),
        style: toast_style(severity),
        position: ToastPosition::TopRight,
    }
}
