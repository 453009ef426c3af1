use crate::api::auth_middleware::{
    with_permission, DELETE_DRINKS, GET_DRINKS_DETAIL, PATCH_DRINKS, POST_DRINKS,
};
use crate::errors::ApiError;
use crate::models::{
    DeleteResponse, Drink, DrinkPatch, DrinksResponse, ErrorBody, NewDrink, ShortDrinksResponse,
};
use crate::openapi::DRINKS_TAG;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{delete, get, patch, post};
use axum::{Extension, Json, Router};
use bearer_auth::DecodedClaims;
use log::{debug, error, info};

/// Path ids that are not integers cannot name a drink
fn parse_id(id: &str) -> Result<i32, ApiError> {
    id.parse().map_err(|_| {
        debug!("Drink id '{id}' is not numeric");
        ApiError::not_found()
    })
}

/// List all drinks in the short (public) representation
#[utoipa::path(
    get,
    path = "/drinks",
    tag = DRINKS_TAG,
    responses(
        (status = 200, description = "All drinks, without ingredient names", body = ShortDrinksResponse),
        (status = 404, description = "Drinks could not be loaded", body = ErrorBody)
    )
)]
pub(crate) async fn list_drinks(
    State(state): State<AppState>,
) -> Result<Json<ShortDrinksResponse>, ApiError> {
    let drinks = state.store.list().await.map_err(|e| {
        error!("Failed to list drinks: {e}");
        ApiError::not_found()
    })?;

    Ok(Json(ShortDrinksResponse {
        success: true,
        drinks: drinks.iter().map(Drink::short).collect(),
    }))
}

/// List all drinks with full recipes
#[utoipa::path(
    get,
    path = "/drinks-detail",
    tag = DRINKS_TAG,
    security(("bearer" = ["get:drinks-detail"])),
    responses(
        (status = 200, description = "All drinks with full recipes", body = DrinksResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Permission not granted", body = ErrorBody),
        (status = 404, description = "Drinks could not be loaded", body = ErrorBody)
    )
)]
pub(crate) async fn list_drinks_detail(
    State(state): State<AppState>,
    Extension(claims): Extension<DecodedClaims>,
) -> Result<Json<DrinksResponse>, ApiError> {
    debug!("Listing drink details for {}", claims.subject());
    let drinks = state.store.list().await.map_err(|e| {
        error!("Failed to list drinks: {e}");
        ApiError::not_found()
    })?;

    Ok(Json(DrinksResponse {
        success: true,
        drinks,
    }))
}

/// Create a drink
#[utoipa::path(
    post,
    path = "/drinks",
    tag = DRINKS_TAG,
    security(("bearer" = ["post:drinks"])),
    request_body = NewDrink,
    responses(
        (status = 200, description = "The created drink", body = DrinksResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Permission not granted", body = ErrorBody),
        (status = 422, description = "Invalid body or duplicate title", body = ErrorBody)
    )
)]
pub(crate) async fn create_drink(
    State(state): State<AppState>,
    Extension(claims): Extension<DecodedClaims>,
    body: Result<Json<NewDrink>, JsonRejection>,
) -> Result<Json<DrinksResponse>, ApiError> {
    let Json(new_drink) = body?;
    let recipe = new_drink.recipe.into_vec();

    let drink = state.store.insert(&new_drink.title, &recipe).await?;
    info!("Drink {} '{}' created by {}", drink.id, drink.title, claims.subject());

    Ok(Json(DrinksResponse {
        success: true,
        drinks: vec![drink.long()],
    }))
}

/// Update the title and/or recipe of a drink.
///
/// Absent or empty fields keep their stored value.
#[utoipa::path(
    patch,
    path = "/drinks/{id}",
    tag = DRINKS_TAG,
    security(("bearer" = ["patch:drinks"])),
    params(("id" = String, Path, description = "Drink id")),
    request_body = DrinkPatch,
    responses(
        (status = 200, description = "The updated drink", body = DrinksResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Permission not granted", body = ErrorBody),
        (status = 404, description = "No such drink", body = ErrorBody),
        (status = 422, description = "Invalid body or duplicate title", body = ErrorBody)
    )
)]
pub(crate) async fn update_drink(
    State(state): State<AppState>,
    Extension(claims): Extension<DecodedClaims>,
    Path(id): Path<String>,
    body: Result<Json<DrinkPatch>, JsonRejection>,
) -> Result<Json<DrinksResponse>, ApiError> {
    let id = parse_id(&id)?;

    let patch = match body {
        Ok(Json(patch)) => patch,
        Err(rejection) => {
            // An unknown drink is reported before a bad body
            state.store.get(id).await?;
            return Err(rejection.into());
        }
    };

    let recipe = patch.recipe();
    let drink = state
        .store
        .update(id, patch.title(), recipe.as_deref())
        .await?;
    info!("Drink {id} updated by {}", claims.subject());

    Ok(Json(DrinksResponse {
        success: true,
        drinks: vec![drink.long()],
    }))
}

/// Delete a drink
#[utoipa::path(
    delete,
    path = "/drinks/{id}",
    tag = DRINKS_TAG,
    security(("bearer" = ["delete:drinks"])),
    params(("id" = String, Path, description = "Drink id")),
    responses(
        (status = 200, description = "The id of the deleted drink", body = DeleteResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 403, description = "Permission not granted", body = ErrorBody),
        (status = 404, description = "No such drink", body = ErrorBody),
        (status = 422, description = "Drink could not be deleted", body = ErrorBody)
    )
)]
pub(crate) async fn delete_drink(
    State(state): State<AppState>,
    Extension(claims): Extension<DecodedClaims>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let drink_id = parse_id(&id)?;

    state.store.delete(drink_id).await?;
    info!("Drink {drink_id} deleted by {}", claims.subject());

    Ok(Json(DeleteResponse {
        success: true,
        delete: id,
    }))
}

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/drinks",
            get(list_drinks).merge(with_permission(state, POST_DRINKS, post(create_drink))),
        )
        .route(
            "/drinks-detail",
            with_permission(state, GET_DRINKS_DETAIL, get(list_drinks_detail)),
        )
        .route(
            "/drinks/{id}",
            with_permission(state, PATCH_DRINKS, patch(update_drink))
                .merge(with_permission(state, DELETE_DRINKS, delete(delete_drink))),
        )
}
