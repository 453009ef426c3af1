use crate::api::{drinks, health};
use crate::models::{
    DeleteResponse, Drink, DrinkPatch, DrinksResponse, ErrorBody, Ingredient, NewDrink,
    RecipeInput, ShortDrink, ShortDrinksResponse, ShortIngredient,
};
use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const DRINKS_TAG: &str = "Drinks API";

/// Registers the bearer JWT scheme referenced by protected operations
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some(
                        "Access token issued by the identity provider, carrying a `permissions` claim",
                    ))
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::ready_check,
        drinks::list_drinks,
        drinks::list_drinks_detail,
        drinks::create_drink,
        drinks::update_drink,
        drinks::delete_drink,
    ),
    components(schemas(
        Ingredient,
        ShortIngredient,
        RecipeInput,
        Drink,
        ShortDrink,
        NewDrink,
        DrinkPatch,
        DrinksResponse,
        ShortDrinksResponse,
        DeleteResponse,
        ErrorBody,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = DRINKS_TAG, description = "Drink menu endpoints"),
    ),
    info(
        title = "Drinks API",
        description = "Drink menu with permission-scoped management",
        version = "1.0.0"
    )
)]
pub(crate) struct ApiDoc;

/// Serves the OpenAPI document at `/openapi.json`
pub(crate) fn router<S: Clone + Send + Sync + 'static>() -> Router<S> {
    Router::new().route(
        "/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
