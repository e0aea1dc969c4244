use std::{convert::Infallible, path::PathBuf, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use warp::{
    filters::body::BodyDeserializeError,
    http::StatusCode,
    reject::{InvalidQuery, LengthRequired, MethodNotAllowed, PayloadTooLarge, Rejection},
    reply::{self, Response},
    Filter, Reply,
};

use crate::{
    assets::AssetStore,
    authentication::{
        jwt::SessionKey,
        middleware::{with_identity, with_session},
    },
    constants::MAX_UPLOAD_BYTES,
    database::{
        actions::users::{LoginPayload, UserPayload},
        error::Error,
        form::FormData,
        schema::{Id, NewTag, RecipePayload},
        store::Datastore,
    },
    handlers,
};

/// Shared handles every handler gets a clone of.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Datastore>,
    pub assets: Arc<dyn AssetStore>,
    pub key: SessionKey,
    pub page_size: i64,
    pub media_root: PathBuf,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    // base64 inflates uploads by a third
    warp::body::content_length_limit(MAX_UPLOAD_BYTES * 2).and(warp::body::json())
}

fn query() -> impl Filter<Extract = (FormData,), Error = Rejection> + Clone {
    warp::query::<FormData>()
}

fn user_routes(state: AppState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let create = warp::path!("api" / "users")
        .and(warp::post())
        .and(json_body::<UserPayload>())
        .and(with_state(state.clone()))
        .and_then(handlers::create_user);

    let me = warp::path!("api" / "users" / "me")
        .and(warp::get())
        .and(with_session(state.key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::current_user);

    let subscriptions = warp::path!("api" / "users" / "subscriptions")
        .and(warp::get())
        .and(query())
        .and(with_session(state.key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::list_subscriptions);

    let profile = warp::path!("api" / "users" / Id)
        .and(warp::get())
        .and(with_identity(state.key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::get_user);

    let subscribe = warp::path!("api" / "users" / Id / "subscribe")
        .and(warp::post())
        .and(query())
        .and(with_session(state.key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::subscribe);

    let unsubscribe = warp::path!("api" / "users" / Id / "subscribe")
        .and(warp::delete())
        .and(with_session(state.key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::unsubscribe);

    let login = warp::path!("api" / "auth" / "token" / "login")
        .and(warp::post())
        .and(json_body::<LoginPayload>())
        .and(with_state(state))
        .and_then(handlers::login);

    create
        .or(me)
        .unify()
        .or(subscriptions)
        .unify()
        .or(profile)
        .unify()
        .or(subscribe)
        .unify()
        .or(unsubscribe)
        .unify()
        .or(login)
        .unify()
}

fn reference_routes(
    state: AppState,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let tags = warp::path!("api" / "tags")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::list_tags);

    let tag = warp::path!("api" / "tags" / Id)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::get_tag);

    let create_tag = warp::path!("api" / "tags")
        .and(warp::post())
        .and(json_body::<NewTag>())
        .and(with_session(state.key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::create_tag);

    let ingredients = warp::path!("api" / "ingredients")
        .and(warp::get())
        .and(query())
        .and(with_state(state.clone()))
        .and_then(handlers::search_ingredients);

    let ingredient = warp::path!("api" / "ingredients" / Id)
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::get_ingredient);

    tags.or(tag)
        .unify()
        .or(create_tag)
        .unify()
        .or(ingredients)
        .unify()
        .or(ingredient)
        .unify()
}

fn recipe_routes(state: AppState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let list = warp::path!("api" / "recipes")
        .and(warp::get())
        .and(query())
        .and(with_identity(state.key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::list_recipes);

    let create = warp::path!("api" / "recipes")
        .and(warp::post())
        .and(with_identity(state.key.clone()))
        .and(json_body::<RecipePayload>())
        .and(with_state(state.clone()))
        .and_then(handlers::create_recipe);

    let download = warp::path!("api" / "recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(state.key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::download_shopping_cart);

    let detail = warp::path!("api" / "recipes" / Id)
        .and(warp::get())
        .and(with_identity(state.key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::get_recipe);

    let update = warp::path!("api" / "recipes" / Id)
        .and(warp::patch())
        .and(with_identity(state.key.clone()))
        .and(json_body::<RecipePayload>())
        .and(with_state(state.clone()))
        .and_then(handlers::update_recipe);

    let delete = warp::path!("api" / "recipes" / Id)
        .and(warp::delete())
        .and(with_identity(state.key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::delete_recipe);

    let add_relation = warp::path!("api" / "recipes" / Id / String)
        .and(warp::post())
        .and(with_identity(state.key.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::add_relation);

    let remove_relation = warp::path!("api" / "recipes" / Id / String)
        .and(warp::delete())
        .and(with_identity(state.key.clone()))
        .and(with_state(state))
        .and_then(handlers::remove_relation);

    list.or(create)
        .unify()
        .or(download)
        .unify()
        .or(detail)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(add_relation)
        .unify()
        .or(remove_relation)
        .unify()
}

fn media_routes(state: &AppState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path("media")
        .and(warp::get())
        .and(warp::fs::dir(state.media_root.clone()))
        .map(|file: warp::fs::File| file.into_response())
}

pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let media = media_routes(&state);

    user_routes(state.clone())
        .or(reference_routes(state.clone()))
        .unify()
        .or(recipe_routes(state))
        .unify()
        .or(media)
        .unify()
        .with(warp::log("foodgram"))
        .recover(handle_rejection)
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, detail) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, String::from("Not found"))
    } else if let Some(e) = err.find::<Error>() {
        (
            StatusCode::from_u16(e.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            e.to_string(),
        )
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            String::from("Payload too large"),
        )
    } else if err.find::<LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            String::from("Content length required"),
        )
    } else if err.find::<MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            String::from("Method not allowed"),
        )
    } else {
        log::error!("Unhandled rejection: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            String::from("Internal server error"),
        )
    };

    Ok(reply::with_status(reply::json(&ErrorBody { detail }), code))
}
