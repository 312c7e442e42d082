//! ---
//! mig_section: "03-logging"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Structured logging helpers for migration runs."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---

/// Emit an informational log enriched with migration context.
#[macro_export]
macro_rules! mig_info {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::INFO,
            scope = ctx.scope.unwrap_or(""),
            role = ctx.role.unwrap_or(""),
            namespace = ctx.namespace.unwrap_or(""),
            phase = ctx.phase_str(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        let ctx = &$crate::LogContext::default();
        tracing::event!(
            tracing::Level::INFO,
            scope = ctx.scope.unwrap_or(""),
            role = ctx.role.unwrap_or(""),
            namespace = ctx.namespace.unwrap_or(""),
            phase = ctx.phase_str(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit a debug log enriched with migration context.
#[macro_export]
macro_rules! mig_debug {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::DEBUG,
            scope = ctx.scope.unwrap_or(""),
            role = ctx.role.unwrap_or(""),
            namespace = ctx.namespace.unwrap_or(""),
            phase = ctx.phase_str(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        let ctx = &$crate::LogContext::default();
        tracing::event!(
            tracing::Level::DEBUG,
            scope = ctx.scope.unwrap_or(""),
            role = ctx.role.unwrap_or(""),
            namespace = ctx.namespace.unwrap_or(""),
            phase = ctx.phase_str(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit a warning log enriched with migration context.
#[macro_export]
macro_rules! mig_warn {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::WARN,
            scope = ctx.scope.unwrap_or(""),
            role = ctx.role.unwrap_or(""),
            namespace = ctx.namespace.unwrap_or(""),
            phase = ctx.phase_str(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        let ctx = &$crate::LogContext::default();
        tracing::event!(
            tracing::Level::WARN,
            scope = ctx.scope.unwrap_or(""),
            role = ctx.role.unwrap_or(""),
            namespace = ctx.namespace.unwrap_or(""),
            phase = ctx.phase_str(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an error log enriched with migration context.
#[macro_export]
macro_rules! mig_error {
    (context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            tracing::Level::ERROR,
            scope = ctx.scope.unwrap_or(""),
            role = ctx.role.unwrap_or(""),
            namespace = ctx.namespace.unwrap_or(""),
            phase = ctx.phase_str(),
            message = %format_args!($($arg)+)
        );
    }};
    ($($arg:tt)+) => {{
        let ctx = &$crate::LogContext::default();
        tracing::event!(
            tracing::Level::ERROR,
            scope = ctx.scope.unwrap_or(""),
            role = ctx.role.unwrap_or(""),
            namespace = ctx.namespace.unwrap_or(""),
            phase = ctx.phase_str(),
            message = %format_args!($($arg)+)
        );
    }};
}
