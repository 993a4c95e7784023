use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use tracing::{error, info, instrument, warn};

use crate::{
    db::{DbError, Engine},
    dependencies::with_session,
    error::ApiError,
    extractors::ValidatedJson,
    response::Envelope,
    state::AppState,
    users::{
        dto::{PublicUser, RegisterRequest},
        password::hash_password,
        repo::UserRepository,
    },
};

const EMAIL_TAKEN: &str = "Email already registered";

fn email_taken() -> ApiError {
    ApiError::Duplicate {
        field: "email",
        message: EMAIL_TAKEN.into(),
    }
}

/// `POST /register`
///
/// The existence check and the insert are not atomic. A concurrent duplicate
/// that slips past the check hits the unique constraint instead and is
/// reported with the same 400.
#[instrument(skip(state, payload))]
pub async fn register<E, U>(
    State(state): State<AppState<E, U>>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Envelope<PublicUser>>), ApiError>
where
    E: Engine,
    U: UserRepository<E::Session> + 'static,
{
    let users = Arc::clone(&state.users);

    let user = with_session(&state.sessions, move |session| {
        Box::pin(async move {
            if users.email_exists(session, &payload.email).await? {
                warn!(email = %payload.email, "email already registered");
                return Err(email_taken());
            }

            let hash = hash_password(&payload.password).map_err(|e| {
                error!(error = %e, "hash_password failed");
                ApiError::Internal(e.to_string())
            })?;

            let created = users
                .create(session, payload.to_new_user(hash))
                .await
                .map_err(|e| match e {
                    DbError::Conflict(constraint) => {
                        warn!(%constraint, email = %payload.email, "lost registration race");
                        email_taken()
                    }
                    other => ApiError::Database(other),
                })?;

            info!(user_id = created.id, email = %created.email, "user registered");
            Ok::<_, ApiError>(PublicUser::from(payload))
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(Envelope::success(user))))
}
