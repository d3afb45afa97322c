use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::events::PrisonerMovementEvent;
use crate::lifecycle::{AllocationLifecycle, MovementOutcome};
use crate::state::AppState;

pub async fn prisoner_movement(
    State(state): State<AppState>,
    Json(mut event): Json<PrisonerMovementEvent>,
) -> AppResult<Json<MovementOutcome>> {
    event.prisoner_number = super::prisoner_number(&event.prisoner_number)?;
    event.prison_code = event
        .prison_code
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty());
    let outcome = AllocationLifecycle::new(&state)
        .handle_movement(&event)
        .await?;
    Ok(Json(outcome))
}
