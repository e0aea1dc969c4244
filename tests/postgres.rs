//! Runs the datastore contract against PostgreSQL. Every test creates its own
//! schema and drops it afterwards. Without `DATABASE_URL` the tests return early.

mod common;

use common::*;
use foodgram::{
    error::Error,
    postgres::PgStore,
    schema::{
        Id, IngredientAmount, NewIngredient, NewUser, Recipe, RecipeFilter, RecipeRelation,
        RecipeWrite, ShoppingListEntry, UserRole,
    },
    store::Datastore,
};
use pretty_assertions::assert_eq;
use sqlx::{postgres::PgPoolOptions, Executor, Pool, Postgres};
use uuid::Uuid;

struct TestDatabase {
    store: PgStore,
    admin: Pool<Postgres>,
    schema: String,
}

impl TestDatabase {
    async fn connect() -> Option<Self> {
        let url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("DATABASE_URL not set, skipping PostgreSQL test");
                return None;
            }
        };

        let schema = format!("foodgram_test_{}", Uuid::new_v4().simple());
        let admin = PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .unwrap();
        admin
            .execute(format!("CREATE SCHEMA {schema}").as_str())
            .await
            .unwrap();

        let search_path = format!("SET search_path TO {schema}");
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .after_connect(move |conn, _meta| {
                let search_path = search_path.clone();
                Box::pin(async move {
                    conn.execute(search_path.as_str()).await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await
            .unwrap();

        let store = PgStore::new(pool);
        store.init_schema().await.unwrap();
        // running it twice must be harmless
        store.init_schema().await.unwrap();

        Some(Self {
            store,
            admin,
            schema,
        })
    }

    async fn teardown(self) {
        self.admin
            .execute(format!("DROP SCHEMA {} CASCADE", self.schema).as_str())
            .await
            .unwrap();
    }
}

async fn insert_user(store: &PgStore, name: &str) -> Id {
    store
        .insert_user(NewUser {
            email: format!("{name}@example.com"),
            username: name.to_string(),
            first_name: String::from("Test"),
            last_name: String::from("User"),
            password: String::from("hash"),
            role: UserRole::User,
        })
        .await
        .unwrap()
        .id
}

fn write(ingredients: &[(Id, i32)], tags: &[Id]) -> RecipeWrite {
    RecipeWrite {
        name: String::from("Pancakes"),
        text: String::from("Mix everything and fry."),
        cooking_time: 25,
        image: Some(String::from("recipes/pancakes.png")),
        ingredients: ingredients
            .iter()
            .map(|(id, amount)| IngredientAmount {
                id: *id,
                amount: *amount,
            })
            .collect(),
        tags: tags.to_vec(),
    }
}

#[tokio::test]
async fn shopping_list_sums_across_cart() {
    let Some(db) = TestDatabase::connect().await else {
        return;
    };
    let store = &db.store;
    seed_reference_data(store).await;
    let author = insert_user(store, "author").await;
    let reader = insert_user(store, "reader").await;

    let soup = store
        .insert_recipe(author, write(&[(SALT, 5), (FLOUR, 100)], &[LUNCH]))
        .await
        .unwrap();
    let bread = store
        .insert_recipe(author, write(&[(SALT, 3), (EGGS, 2)], &[BREAKFAST]))
        .await
        .unwrap();
    for recipe in [soup, bread] {
        store
            .insert_relation(RecipeRelation::ShoppingCart, reader, recipe)
            .await
            .unwrap();
    }

    let entry = |name: &str, unit: &str, total_amount: i64| ShoppingListEntry {
        name: name.to_string(),
        measurement_unit: unit.to_string(),
        total_amount,
    };
    assert_eq!(
        store.shopping_list(reader).await.unwrap(),
        vec![
            entry("Eggs", "pcs", 2),
            entry("Flour", "g", 100),
            entry("Salt", "g", 8),
        ]
    );
    assert_eq!(store.shopping_list(author).await.unwrap(), vec![]);

    db.teardown().await;
}

#[tokio::test]
async fn delete_cascades_to_dependent_rows() {
    let Some(db) = TestDatabase::connect().await else {
        return;
    };
    let store = &db.store;
    seed_reference_data(store).await;
    let author = insert_user(store, "author").await;
    let reader = insert_user(store, "reader").await;

    let id = store
        .insert_recipe(author, write(&[(SALT, 5), (FLOUR, 100)], &[LUNCH, DINNER]))
        .await
        .unwrap();
    store
        .insert_relation(RecipeRelation::Favorite, reader, id)
        .await
        .unwrap();
    store
        .insert_relation(RecipeRelation::ShoppingCart, reader, id)
        .await
        .unwrap();

    let counts = store.recipe_row_counts(id).await.unwrap();
    assert_eq!((counts.ingredients, counts.tags), (2, 2));

    assert!(store.delete_recipe(id).await.unwrap());
    let counts = store.recipe_row_counts(id).await.unwrap();
    assert_eq!(counts.ingredients, 0);
    assert_eq!(counts.tags, 0);
    assert_eq!(counts.favorites, 0);
    assert_eq!(counts.shopping_carts, 0);
    assert!(!store.delete_recipe(id).await.unwrap());

    db.teardown().await;
}

#[tokio::test]
async fn duplicate_relations_and_self_subscriptions_conflict() {
    let Some(db) = TestDatabase::connect().await else {
        return;
    };
    let store = &db.store;
    seed_reference_data(store).await;
    let author = insert_user(store, "author").await;
    let reader = insert_user(store, "reader").await;
    let id = store
        .insert_recipe(author, write(&[(SALT, 5)], &[]))
        .await
        .unwrap();

    store
        .insert_relation(RecipeRelation::Favorite, reader, id)
        .await
        .unwrap();
    let result = store
        .insert_relation(RecipeRelation::Favorite, reader, id)
        .await;
    assert!(matches!(result, Err(Error::Conflict(_))));
    assert!(store
        .has_relation(RecipeRelation::Favorite, reader, id)
        .await
        .unwrap());
    assert!(!store
        .has_relation(RecipeRelation::ShoppingCart, reader, id)
        .await
        .unwrap());

    let result = store
        .insert_relation(RecipeRelation::Favorite, reader, id + 1)
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    let result = store.insert_subscription(reader, reader).await;
    assert!(matches!(result, Err(Error::Conflict(_))));
    assert!(!store.is_subscribed(reader, reader).await.unwrap());

    store.insert_subscription(reader, author).await.unwrap();
    let result = store.insert_subscription(reader, author).await;
    assert!(matches!(result, Err(Error::Conflict(_))));
    assert!(store.delete_subscription(reader, author).await.unwrap());
    assert!(!store.delete_subscription(reader, author).await.unwrap());

    db.teardown().await;
}

#[tokio::test]
async fn failed_replace_keeps_previous_recipe() {
    let Some(db) = TestDatabase::connect().await else {
        return;
    };
    let store = &db.store;
    seed_reference_data(store).await;
    let author = insert_user(store, "author").await;
    let id = store
        .insert_recipe(author, write(&[(SALT, 5)], &[LUNCH]))
        .await
        .unwrap();

    let result = store
        .replace_recipe(id, write(&[(FLOUR, 100), (42, 1)], &[DINNER]))
        .await;
    assert!(matches!(result, Err(Error::Conflict(_))));

    let result = store
        .replace_recipe(id, write(&[(SALT, 1), (SALT, 2)], &[]))
        .await;
    assert!(matches!(result, Err(Error::Conflict(_))));

    let parts = store.recipe_parts(id).await.unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!((parts[0].id, parts[0].amount), (SALT, 5));
    let tags = store.recipe_tags(id).await.unwrap();
    assert_eq!(tags.iter().map(|t| t.id).collect::<Vec<_>>(), vec![LUNCH]);

    let mut update = write(&[(FLOUR, 100)], &[DINNER]);
    update.image = None;
    store.replace_recipe(id, update).await.unwrap();
    let recipe = store.get_recipe(id).await.unwrap().unwrap();
    assert_eq!(recipe.image, "recipes/pancakes.png");
    assert_eq!(store.recipe_parts(id).await.unwrap()[0].id, FLOUR);

    let result = store.replace_recipe(id + 1, write(&[(SALT, 1)], &[])).await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    db.teardown().await;
}

#[tokio::test]
async fn filters_combine_and_count_all_matches() {
    let Some(db) = TestDatabase::connect().await else {
        return;
    };
    let store = &db.store;
    seed_reference_data(store).await;
    let author = insert_user(store, "author").await;
    let other = insert_user(store, "other").await;

    let lunch = store
        .insert_recipe(author, write(&[(SALT, 1)], &[LUNCH]))
        .await
        .unwrap();
    let dinner = store
        .insert_recipe(author, write(&[(SALT, 1)], &[DINNER]))
        .await
        .unwrap();
    let foreign = store
        .insert_recipe(other, write(&[(SALT, 1)], &[LUNCH, DINNER]))
        .await
        .unwrap();
    store
        .insert_relation(RecipeRelation::Favorite, other, lunch)
        .await
        .unwrap();

    let ids = |rows: Vec<Recipe>| rows.into_iter().map(|r| r.id).collect::<Vec<_>>();

    let (rows, total) = store
        .filter_recipes(&RecipeFilter::default(), 2, 0)
        .await
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(ids(rows), vec![foreign, dinner]);

    let filter = RecipeFilter {
        tags: vec![String::from("lunch"), String::from("dinner")],
        author: Some(author),
        ..RecipeFilter::default()
    };
    let (rows, total) = store.filter_recipes(&filter, 10, 0).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(ids(rows), vec![dinner, lunch]);

    let filter = RecipeFilter {
        favorited_by: Some(other),
        ..RecipeFilter::default()
    };
    let (rows, total) = store.filter_recipes(&filter, 10, 0).await.unwrap();
    assert_eq!((ids(rows), total), (vec![lunch], 1));

    let (rows, total) = store
        .filter_recipes(&RecipeFilter::default(), 10, 10)
        .await
        .unwrap();
    assert_eq!((rows.len(), total), (0, 3));

    db.teardown().await;
}

#[tokio::test]
async fn emails_are_unique_regardless_of_case() {
    let Some(db) = TestDatabase::connect().await else {
        return;
    };
    let store = &db.store;
    insert_user(store, "cook").await;

    let result = store
        .insert_user(NewUser {
            email: String::from("COOK@example.com"),
            username: String::from("cook2"),
            first_name: String::from("Test"),
            last_name: String::from("User"),
            password: String::from("hash"),
            role: UserRole::User,
        })
        .await;
    assert!(matches!(result, Err(Error::Conflict(_))));

    let user = store.get_user_by_email("Cook@Example.com").await.unwrap();
    assert_eq!(user.map(|u| u.username), Some(String::from("cook")));

    db.teardown().await;
}

#[tokio::test]
async fn names_sort_case_insensitively() {
    let Some(db) = TestDatabase::connect().await else {
        return;
    };
    let store = &db.store;
    let ingredient = |name: &str| NewIngredient {
        name: name.to_string(),
        measurement_unit: String::from("g"),
    };
    store
        .insert_ingredients(vec![
            ingredient("Salted butter"),
            ingredient("salt"),
            ingredient("Salt"),
        ])
        .await
        .unwrap();

    let names: Vec<String> = store
        .search_ingredients("sal")
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, vec!["Salt", "salt", "Salted butter"]);

    db.teardown().await;
}
