#![allow(dead_code)]

use foodgram::{
    actions::users::{create_user_with_role, UserPayload},
    assets::FsAssetStore,
    error::Error,
    jwt::SessionData,
    memory::MemoryStore,
    schema::{Id, IngredientAmount, NewIngredient, NewTag, RecipePayload, UserProfile, UserRole},
    store::Datastore,
};
use tempfile::TempDir;

// 1x1 transparent png
pub const PNG: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

pub const SALT: Id = 1;
pub const FLOUR: Id = 2;
pub const SUGAR: Id = 3;
pub const EGGS: Id = 4;

pub const BREAKFAST: Id = 1;
pub const LUNCH: Id = 2;
pub const DINNER: Id = 3;

pub struct Fixture {
    pub store: MemoryStore,
    pub assets: FsAssetStore,
    pub media: TempDir,
    pub author: SessionData,
    pub reader: SessionData,
    pub admin: SessionData,
}

pub fn fake_hash(password: &str) -> Result<String, Error> {
    Ok(format!("plain:{password}"))
}

pub fn session(profile: &UserProfile, role: UserRole) -> SessionData {
    SessionData {
        user_id: profile.id,
        username: profile.username.clone(),
        role,
    }
}

pub fn user_payload(username: &str) -> UserPayload {
    UserPayload {
        email: format!("{username}@example.com"),
        username: username.to_string(),
        first_name: String::from("Test"),
        last_name: String::from("User"),
        password: String::from("password"),
    }
}

pub async fn seed_reference_data(store: &dyn Datastore) {
    let ingredients = [("Salt", "g"), ("Flour", "g"), ("Sugar", "g"), ("Eggs", "pcs")]
        .iter()
        .map(|(name, unit)| NewIngredient {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
        })
        .collect();
    store.insert_ingredients(ingredients).await.unwrap();

    for (name, color, slug) in [
        ("Breakfast", "#E26C2D", "breakfast"),
        ("Lunch", "#49B64E", "lunch"),
        ("Dinner", "#8775D2", "dinner"),
    ] {
        store
            .insert_tag(NewTag {
                name: name.to_string(),
                color: color.to_string(),
                slug: slug.to_string(),
            })
            .await
            .unwrap();
    }
}

pub async fn fixture() -> Fixture {
    let store = MemoryStore::new();
    seed_reference_data(&store).await;

    let mut sessions = Vec::new();
    for (name, role) in [
        ("author", UserRole::User),
        ("reader", UserRole::User),
        ("admin", UserRole::Admin),
    ] {
        let profile = create_user_with_role(user_payload(name), role, &store, fake_hash)
            .await
            .unwrap();
        sessions.push(session(&profile, role));
    }
    let admin = sessions.remove(2);
    let reader = sessions.remove(1);
    let author = sessions.remove(0);

    let media = tempfile::tempdir().unwrap();
    let assets = FsAssetStore::new(media.path());

    Fixture {
        store,
        assets,
        media,
        author,
        reader,
        admin,
    }
}

pub fn payload(ingredients: &[(Id, i32)], tags: &[Id]) -> RecipePayload {
    RecipePayload {
        ingredients: ingredients
            .iter()
            .map(|(id, amount)| IngredientAmount {
                id: *id,
                amount: *amount,
            })
            .collect(),
        tags: tags.to_vec(),
        image: Some(PNG.to_string()),
        name: String::from("Pancakes"),
        text: String::from("Mix everything and fry."),
        cooking_time: 25,
    }
}
