use anyhow::{Result as AnyResult, anyhow};
use log::{debug, error};
use pollster::block_on;
use wgpu::{CommandBuffer, Device, ErrorFilter, Queue};

/// Submit command buffers inside a validation error scope, mapping any error
/// into anyhow with context.
///
/// # Errors
/// Returns an error if WGPU validation fails during submission.
pub fn submit_with_validation<I>(device: &Device, queue: &Queue, submissions: I) -> AnyResult<()>
where
    I: IntoIterator<Item = CommandBuffer>,
{
    device.push_error_scope(ErrorFilter::Validation);
    queue.submit(submissions);
    if let Some(err) = block_on(device.pop_error_scope()) {
        error!(target: "wgpu_renderer", "WGPU error on submit: {err:?}");
        return Err(anyhow!("wgpu scoped error on submit: {err}"));
    }
    debug!(target: "wgpu_renderer", "submission validated");
    Ok(())
}

/// Run `create` while validation and out-of-memory scopes are active.
///
/// # Errors
/// Returns an error if WGPU reports a validation or allocation failure for
/// anything created inside the scope.
pub fn with_validation_scope<F, T>(device: &Device, label: &str, create: F) -> AnyResult<T>
where
    F: FnOnce() -> T,
{
    device.push_error_scope(ErrorFilter::OutOfMemory);
    device.push_error_scope(ErrorFilter::Validation);
    let out = create();
    let validation = block_on(device.pop_error_scope());
    let memory = block_on(device.pop_error_scope());
    if let Some(err) = validation.or(memory) {
        error!(target: "wgpu_renderer", "WGPU error in scope '{label}': {err:?}");
        return Err(anyhow!("wgpu scoped error in '{label}': {err}"));
    }
    Ok(out)
}
