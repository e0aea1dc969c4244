use serde::Serialize;
use warp::{
    http::StatusCode,
    reject::Rejection,
    reply::{self, Response},
    Reply,
};

use crate::{
    authentication::{cryptography::hash_password, jwt::SessionData, middleware::Identity},
    constants::{SHOPPING_LIST_FILENAME, USER_COUNT_PER_PAGE},
    database::{
        actions::{
            ingredients, perform,
            recipes::{self, RecipeQuery},
            shopping_list, subscriptions, tags,
            users::{self, LoginPayload, UserPayload},
            RecipeOperation, RecipeOutcome,
        },
        error::Error,
        form::{Form, FormData},
        pagination::PageRequest,
        schema::{Id, NewTag, RecipePayload, RecipeRelation},
    },
    routes::AppState,
};

fn reject(error: Error) -> Rejection {
    warp::reject::custom(error)
}

fn json_response<T: Serialize>(value: &T, status: StatusCode) -> Response {
    reply::with_status(reply::json(value), status).into_response()
}

fn outcome_response(outcome: RecipeOutcome, status: StatusCode) -> Response {
    match outcome {
        RecipeOutcome::Detail(detail) => json_response(&detail, status),
        RecipeOutcome::Summary(summary) => json_response(&summary, status),
        RecipeOutcome::Removed => StatusCode::NO_CONTENT.into_response(),
    }
}

fn page_request(form: &Form, default_limit: i64) -> Result<PageRequest, Error> {
    PageRequest::new(
        form.get_optional_number("page")?,
        form.get_optional_number("limit")?,
        default_limit,
    )
}

async fn run_recipe_operation(
    operation: RecipeOperation,
    identity: Identity,
    state: &AppState,
    status: StatusCode,
) -> Result<Response, Rejection> {
    let outcome = perform(operation, &identity, state.store.as_ref(), state.assets.as_ref())
        .await
        .map_err(reject)?;

    Ok(outcome_response(outcome, status))
}

// users

pub async fn create_user(payload: UserPayload, state: AppState) -> Result<Response, Rejection> {
    let profile = users::create_user(payload, state.store.as_ref(), hash_password)
        .await
        .map_err(reject)?;

    Ok(json_response(&profile, StatusCode::CREATED))
}

pub async fn login(payload: LoginPayload, state: AppState) -> Result<Response, Rejection> {
    let token = users::login_user(payload, state.store.as_ref(), &state.key)
        .await
        .map_err(reject)?;

    Ok(json_response(&token, StatusCode::OK))
}

pub async fn current_user(session: SessionData, state: AppState) -> Result<Response, Rejection> {
    let profile = users::get_profile(session.user_id, Some(session.user_id), state.store.as_ref())
        .await
        .map_err(reject)?;

    Ok(json_response(&profile, StatusCode::OK))
}

pub async fn get_user(
    id: Id,
    identity: Identity,
    state: AppState,
) -> Result<Response, Rejection> {
    let profile = users::get_profile(id, identity.user_id(), state.store.as_ref())
        .await
        .map_err(reject)?;

    Ok(json_response(&profile, StatusCode::OK))
}

pub async fn list_subscriptions(
    query: FormData,
    session: SessionData,
    state: AppState,
) -> Result<Response, Rejection> {
    let form = Form::from_data(query);
    let page = page_request(&form, USER_COUNT_PER_PAGE).map_err(reject)?;
    let recipes_limit = form
        .get_optional_number("recipes_limit")
        .map_err(reject)?;

    let page = subscriptions::list_subscriptions(&session, page, recipes_limit, state.store.as_ref())
        .await
        .map_err(reject)?;

    Ok(json_response(&page, StatusCode::OK))
}

pub async fn subscribe(
    id: Id,
    query: FormData,
    session: SessionData,
    state: AppState,
) -> Result<Response, Rejection> {
    let recipes_limit = Form::from_data(query)
        .get_optional_number("recipes_limit")
        .map_err(reject)?;

    let entry = subscriptions::subscribe(id, recipes_limit, &session, state.store.as_ref())
        .await
        .map_err(reject)?;

    Ok(json_response(&entry, StatusCode::CREATED))
}

pub async fn unsubscribe(
    id: Id,
    session: SessionData,
    state: AppState,
) -> Result<Response, Rejection> {
    subscriptions::unsubscribe(id, &session, state.store.as_ref())
        .await
        .map_err(reject)?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

// reference data

pub async fn list_tags(state: AppState) -> Result<Response, Rejection> {
    let tags = tags::list_tags(state.store.as_ref()).await.map_err(reject)?;

    Ok(json_response(&tags, StatusCode::OK))
}

pub async fn get_tag(id: Id, state: AppState) -> Result<Response, Rejection> {
    let tag = tags::get_tag(id, state.store.as_ref())
        .await
        .map_err(reject)?;

    Ok(json_response(&tag, StatusCode::OK))
}

pub async fn create_tag(
    tag: NewTag,
    session: SessionData,
    state: AppState,
) -> Result<Response, Rejection> {
    let tag = tags::create_tag(tag, &session, state.store.as_ref())
        .await
        .map_err(reject)?;

    Ok(json_response(&tag, StatusCode::CREATED))
}

pub async fn search_ingredients(query: FormData, state: AppState) -> Result<Response, Rejection> {
    let prefix = Form::from_data(query).get_str("name").unwrap_or_default();
    let ingredients = ingredients::search_ingredients(&prefix, state.store.as_ref())
        .await
        .map_err(reject)?;

    Ok(json_response(&ingredients, StatusCode::OK))
}

pub async fn get_ingredient(id: Id, state: AppState) -> Result<Response, Rejection> {
    let ingredient = ingredients::get_ingredient(id, state.store.as_ref())
        .await
        .map_err(reject)?;

    Ok(json_response(&ingredient, StatusCode::OK))
}

// recipes

pub async fn list_recipes(
    query: FormData,
    identity: Identity,
    state: AppState,
) -> Result<Response, Rejection> {
    let form = Form::from_data(query);
    let page = page_request(&form, state.page_size).map_err(reject)?;
    let query = RecipeQuery::from_form(&form).map_err(reject)?;

    let page = recipes::list_recipes(query, identity.user_id(), page, state.store.as_ref())
        .await
        .map_err(reject)?;

    Ok(json_response(&page, StatusCode::OK))
}

pub async fn create_recipe(
    identity: Identity,
    payload: RecipePayload,
    state: AppState,
) -> Result<Response, Rejection> {
    run_recipe_operation(
        RecipeOperation::Create(payload),
        identity,
        &state,
        StatusCode::CREATED,
    )
    .await
}

pub async fn get_recipe(
    id: Id,
    identity: Identity,
    state: AppState,
) -> Result<Response, Rejection> {
    run_recipe_operation(RecipeOperation::Read(id), identity, &state, StatusCode::OK).await
}

pub async fn update_recipe(
    id: Id,
    identity: Identity,
    payload: RecipePayload,
    state: AppState,
) -> Result<Response, Rejection> {
    run_recipe_operation(
        RecipeOperation::Update(id, payload),
        identity,
        &state,
        StatusCode::OK,
    )
    .await
}

pub async fn delete_recipe(
    id: Id,
    identity: Identity,
    state: AppState,
) -> Result<Response, Rejection> {
    run_recipe_operation(RecipeOperation::Delete(id), identity, &state, StatusCode::OK).await
}

async fn toggle_relation(
    recipe_id: Id,
    relation: String,
    add: bool,
    identity: Identity,
    state: AppState,
) -> Result<Response, Rejection> {
    let relation =
        RecipeRelation::try_from(relation.as_str()).map_err(|_| warp::reject::not_found())?;

    run_recipe_operation(
        RecipeOperation::Toggle {
            relation,
            recipe_id,
            add,
        },
        identity,
        &state,
        StatusCode::CREATED,
    )
    .await
}

pub async fn add_relation(
    recipe_id: Id,
    relation: String,
    identity: Identity,
    state: AppState,
) -> Result<Response, Rejection> {
    toggle_relation(recipe_id, relation, true, identity, state).await
}

pub async fn remove_relation(
    recipe_id: Id,
    relation: String,
    identity: Identity,
    state: AppState,
) -> Result<Response, Rejection> {
    toggle_relation(recipe_id, relation, false, identity, state).await
}

pub async fn download_shopping_cart(
    session: SessionData,
    state: AppState,
) -> Result<Response, Rejection> {
    let text = shopping_list::download_shopping_list(&session, state.store.as_ref())
        .await
        .map_err(reject)?;

    let reply = reply::with_header(text, "content-type", "text/plain; charset=utf-8");
    let reply = reply::with_header(
        reply,
        "content-disposition",
        format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\""),
    );

    Ok(reply.into_response())
}
