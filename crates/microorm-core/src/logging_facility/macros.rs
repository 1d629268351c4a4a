//! Operation boundary macros
//!
//! `$op` is anything implementing `Display`, normally an
//! [`OpName`](microorm_core_types::OpName).

/// Log the start of an operation
///
/// ```
/// # use microorm_core::log_op_start;
/// use microorm_core::microorm_core_types::OpName;
/// log_op_start!(OpName::Get);
/// log_op_start!(OpName::Get, entity = "Account");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = %$op,
            event = $crate::microorm_core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = %$op,
            event = $crate::microorm_core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// ```
/// # use microorm_core::log_op_end;
/// use microorm_core::microorm_core_types::OpName;
/// log_op_end!(OpName::Save, duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = %$op,
            event = $crate::microorm_core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = %$op,
            event = $crate::microorm_core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log a failed operation with its stable error code
///
/// ```
/// # use microorm_core::log_op_error;
/// use microorm_core::microorm_core_types::OpName;
/// use microorm_core::OrmError;
/// let err = OrmError::UnknownAlias { alias: "reporting".to_string() };
/// log_op_error!(OpName::OpenSession, err, duration_ms = 0);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = %$op,
            event = $crate::microorm_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?ex_err.kind(),
            err.code = ex_err.code(),
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        let ex_err: $crate::errors::ExError = $err.into();
        tracing::error!(
            component = module_path!(),
            op = %$op,
            event = $crate::microorm_core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?ex_err.kind(),
            err.code = ex_err.code(),
            $($field)*
        );
    }};
}
