// Completion checks for text entry and option selection.
use crate::driver::traits::UiDriver;
use crate::driver::types::{ElementHandle, UiAction};
use crate::errors::TransientFailure;

/// Line endings differ between what was typed and what a field reports.
pub fn normalize_value(value: &str) -> String {
    value.replace("\r\n", "\n")
}

pub fn text_matches(expected: &str, actual: &str) -> bool {
    normalize_value(expected) == normalize_value(actual)
}

/// The selected value must equal the request exactly; the visible label may
/// differ in case and surrounding whitespace.
pub fn option_matches(requested: &str, value: Option<&str>, label: Option<&str>) -> bool {
    if value == Some(requested) {
        return true;
    }
    let wanted = requested.trim().to_lowercase();
    label.is_some_and(|l| l.trim().to_lowercase() == wanted)
}

fn read_failed(e: impl std::fmt::Display) -> TransientFailure {
    TransientFailure::DispatchFailed(format!("reading back value: {e}"))
}

/// Re-read the element after a structural dispatch.
pub async fn check_element(
    driver: &dyn UiDriver,
    handle: &ElementHandle,
    action: &UiAction,
) -> Result<(), TransientFailure> {
    match action {
        UiAction::Click => Ok(()),
        UiAction::SetValue { value, .. } => {
            let actual = driver.read_value(handle).await.map_err(read_failed)?;
            match actual {
                Some(ref a) if text_matches(value, a) => Ok(()),
                _ => Err(TransientFailure::CompletionMismatch {
                    expected: value.clone(),
                    actual,
                }),
            }
        }
        UiAction::SelectOption { value } => {
            let selected = driver.read_value(handle).await.map_err(read_failed)?;
            let label = driver.selected_label(handle).await.map_err(read_failed)?;
            if option_matches(value, selected.as_deref(), label.as_deref()) {
                Ok(())
            } else {
                Err(TransientFailure::CompletionMismatch {
                    expected: value.clone(),
                    actual: label.or(selected),
                })
            }
        }
    }
}

/// Check after synthetic input. Skipped when the driver cannot report the
/// focused value.
pub async fn check_focused(driver: &dyn UiDriver, action: &UiAction) -> Result<(), TransientFailure> {
    let expected = match action {
        UiAction::Click => return Ok(()),
        UiAction::SetValue { value, .. } | UiAction::SelectOption { value } => value,
    };
    let Some(actual) = driver.focused_value().await.map_err(read_failed)? else {
        tracing::debug!("focused value unavailable, relying on verifier");
        return Ok(());
    };
    let ok = match action {
        UiAction::SelectOption { .. } => option_matches(expected, Some(&actual), Some(&actual)),
        _ => text_matches(expected, &actual),
    };
    if ok {
        Ok(())
    } else {
        Err(TransientFailure::CompletionMismatch {
            expected: expected.clone(),
            actual: Some(actual),
        })
    }
}
