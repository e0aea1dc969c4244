use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    database::{
        error::Error,
        pagination::{PageContext, PageRequest},
        schema::{Id, RecipeSummary, SubscriptionEntry, User, UserProfile},
        store::Datastore,
    },
};

fn check_recipes_limit(recipes_limit: Option<i64>) -> Result<(), Error> {
    match recipes_limit {
        Some(limit) if limit < 0 => Err(Error::validation(
            "recipes_limit must not be negative",
        )),
        _ => Ok(()),
    }
}

async fn build_subscription_entry(
    author: User,
    recipes_limit: Option<i64>,
    store: &dyn Datastore,
) -> Result<SubscriptionEntry, Error> {
    let recipes = store
        .recipes_by_author(author.id, recipes_limit)
        .await?
        .into_iter()
        .map(RecipeSummary::from)
        .collect();
    let recipes_count = store.count_recipes_by_author(author.id).await?;

    Ok(SubscriptionEntry {
        author: UserProfile::from_user(author, true),
        recipes,
        recipes_count,
    })
}

pub async fn subscribe(
    following_id: Id,
    recipes_limit: Option<i64>,
    session: &SessionData,
    store: &dyn Datastore,
) -> Result<SubscriptionEntry, Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    check_recipes_limit(recipes_limit)?;

    if following_id == session.user_id {
        return Err(Error::conflict("Cannot subscribe to yourself"));
    }

    let author = store
        .get_user(following_id)
        .await?
        .ok_or_else(|| Error::not_found("No user exists with specified id"))?;

    store
        .insert_subscription(session.user_id, following_id)
        .await?;

    log::info!("User {} subscribed to {following_id}", session.user_id);

    build_subscription_entry(author, recipes_limit, store).await
}

pub async fn unsubscribe(
    following_id: Id,
    session: &SessionData,
    store: &dyn Datastore,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;

    if !store
        .delete_subscription(session.user_id, following_id)
        .await?
    {
        return Err(Error::not_found("Not subscribed to this user"));
    }

    log::info!("User {} unsubscribed from {following_id}", session.user_id);

    Ok(())
}

/// Followed authors with their newest recipes.
pub async fn list_subscriptions(
    session: &SessionData,
    page: PageRequest,
    recipes_limit: Option<i64>,
    store: &dyn Datastore,
) -> Result<PageContext<SubscriptionEntry>, Error> {
    check_recipes_limit(recipes_limit)?;

    let (authors, total_count) = store
        .list_subscriptions(session.user_id, page.limit, page.offset())
        .await?;

    let mut entries = Vec::with_capacity(authors.len());
    for author in authors {
        entries.push(build_subscription_entry(author, recipes_limit, store).await?);
    }

    Ok(PageContext::from_rows(
        entries,
        total_count,
        page,
        "/api/users/subscriptions",
    ))
}
