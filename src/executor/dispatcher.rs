// Synthetic pointer input for the recognition path.
use crate::driver::traits::UiDriver;
use crate::driver::types::{PointerAction, UiAction};
use crate::errors::TransientFailure;

/// Pointer steps that perform `action` on the control centred at `point`.
/// Option selection only opens the control here; picking the option needs a
/// fresh capture and is done by the caller.
pub fn pointer_steps(action: &UiAction, (x, y): (f64, f64)) -> Vec<PointerAction> {
    let click = PointerAction::Click { x, y };
    match action {
        UiAction::Click | UiAction::SelectOption { .. } => vec![click],
        UiAction::SetValue { value, clear_first } => vec![
            click,
            PointerAction::TypeText {
                text: value.clone(),
                clear_first: *clear_first,
            },
        ],
    }
}

pub async fn dispatch_pointer(driver: &dyn UiDriver, steps: &[PointerAction]) -> Result<(), TransientFailure> {
    for step in steps {
        tracing::debug!(?step, "dispatching pointer action");
        driver
            .pointer(step)
            .await
            .map_err(|e| TransientFailure::DispatchFailed(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_clicks_then_types() {
        let steps = pointer_steps(
            &UiAction::SetValue {
                value: "42".into(),
                clear_first: true,
            },
            (10.0, 20.0),
        );
        assert_eq!(
            steps,
            vec![
                PointerAction::Click { x: 10.0, y: 20.0 },
                PointerAction::TypeText {
                    text: "42".into(),
                    clear_first: true
                },
            ]
        );
    }

    #[test]
    fn select_only_opens() {
        let steps = pointer_steps(&UiAction::SelectOption { value: "Red".into() }, (1.0, 2.0));
        assert_eq!(steps, vec![PointerAction::Click { x: 1.0, y: 2.0 }]);
    }
}
