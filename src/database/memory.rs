use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashSet},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    error::Error,
    schema::{
        Id, Ingredient, IngredientAmount, NewIngredient, NewTag, NewUser, Recipe, RecipeFilter,
        RecipePart, RecipeRelation, RecipeRowCounts, RecipeWrite, ShoppingListEntry, Tag, User,
    },
    store::Datastore,
};

/// Table contents of a [`MemoryStore`]. Cloned wholesale at the start of
/// every write and swapped back in only when the write succeeds.
#[derive(Debug, Clone, Default)]
struct Tables {
    last_user_id: Id,
    last_ingredient_id: Id,
    last_tag_id: Id,
    last_recipe_id: Id,

    users: BTreeMap<Id, User>,
    ingredients: BTreeMap<Id, Ingredient>,
    tags: BTreeMap<Id, Tag>,
    recipes: BTreeMap<Id, Recipe>,
    // (recipe_id, ingredient line)
    recipe_ingredients: Vec<(Id, IngredientAmount)>,
    // (recipe_id, tag_id)
    recipe_tags: BTreeSet<(Id, Id)>,
    // (user_id, recipe_id)
    favorites: BTreeSet<(Id, Id)>,
    shopping_carts: BTreeSet<(Id, Id)>,
    // (user_id, following_id)
    subscriptions: BTreeSet<(Id, Id)>,
}

impl Tables {
    fn relation(&self, relation: RecipeRelation) -> &BTreeSet<(Id, Id)> {
        match relation {
            RecipeRelation::Favorite => &self.favorites,
            RecipeRelation::ShoppingCart => &self.shopping_carts,
        }
    }

    fn relation_mut(&mut self, relation: RecipeRelation) -> &mut BTreeSet<(Id, Id)> {
        match relation {
            RecipeRelation::Favorite => &mut self.favorites,
            RecipeRelation::ShoppingCart => &mut self.shopping_carts,
        }
    }

    fn ensure_user(&self, id: Id) -> Result<(), Error> {
        match self.users.contains_key(&id) {
            true => Ok(()),
            false => Err(Error::NotFound(format!("User {id} does not exist"))),
        }
    }

    fn ensure_recipe(&self, id: Id) -> Result<(), Error> {
        match self.recipes.contains_key(&id) {
            true => Ok(()),
            false => Err(Error::NotFound(format!("Recipe {id} does not exist"))),
        }
    }

    /// Writes tag links and ingredient lines, enforcing the same constraints
    /// as the relational schema.
    fn insert_links(&mut self, recipe_id: Id, recipe: &RecipeWrite) -> Result<(), Error> {
        for tag_id in recipe.tags.iter() {
            if !self.tags.contains_key(tag_id) {
                return Err(Error::Conflict(format!("Tag {tag_id} does not exist")));
            }
            if !self.recipe_tags.insert((recipe_id, *tag_id)) {
                return Err(Error::conflict("Duplicate tag in recipe"));
            }
        }

        let mut seen = HashSet::new();
        for part in recipe.ingredients.iter() {
            if !self.ingredients.contains_key(&part.id) {
                return Err(Error::Conflict(format!(
                    "Ingredient {} does not exist",
                    part.id
                )));
            }
            if part.amount <= 0 {
                return Err(Error::conflict("Ingredient amount must be positive"));
            }
            if !seen.insert(part.id) {
                return Err(Error::conflict("Duplicate ingredient in recipe"));
            }
            self.recipe_ingredients.push((recipe_id, *part));
        }

        Ok(())
    }

    fn clear_links(&mut self, recipe_id: Id) {
        self.recipe_tags.retain(|(id, _)| *id != recipe_id);
        self.recipe_ingredients.retain(|(id, _)| *id != recipe_id);
    }
}

/// In-process [`Datastore`] used by the test suites and for running the
/// service without a database. Every operation runs under one lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn read<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&Tables) -> T,
    {
        let tables = self.tables.lock().await;
        f(&tables)
    }

    async fn transaction<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Tables) -> Result<T, Error>,
    {
        let mut tables = self.tables.lock().await;
        let mut draft = tables.clone();
        let value = f(&mut draft)?;
        *tables = draft;

        Ok(value)
    }
}

/// Case-insensitive, then bytewise. Matches `ORDER BY LOWER(x) COLLATE "C", x COLLATE "C"`.
fn by_name(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn sort_newest_first(recipes: &mut [Recipe]) {
    recipes.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, Error> {
        self.transaction(|t| {
            let email = user.email.to_lowercase();
            let taken = t
                .users
                .values()
                .any(|u| u.email.to_lowercase() == email || u.username == user.username);
            if taken {
                return Err(Error::conflict("User with this email or username exists"));
            }

            t.last_user_id += 1;
            let row = User {
                id: t.last_user_id,
                email: user.email,
                username: user.username,
                first_name: user.first_name,
                last_name: user.last_name,
                password: user.password,
                role: user.role,
            };
            t.users.insert(row.id, row.clone());

            Ok(row)
        })
        .await
    }

    async fn get_user(&self, id: Id) -> Result<Option<User>, Error> {
        Ok(self.read(|t| t.users.get(&id).cloned()).await)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let email = email.to_lowercase();
        Ok(self
            .read(|t| {
                t.users
                    .values()
                    .find(|u| u.email.to_lowercase() == email)
                    .cloned()
            })
            .await)
    }

    async fn insert_ingredients(&self, ingredients: Vec<NewIngredient>) -> Result<u64, Error> {
        self.transaction(|t| {
            let mut inserted = 0;
            for ingredient in ingredients {
                let exists = t.ingredients.values().any(|i| {
                    i.name == ingredient.name && i.measurement_unit == ingredient.measurement_unit
                });
                if exists {
                    continue;
                }

                t.last_ingredient_id += 1;
                let id = t.last_ingredient_id;
                t.ingredients.insert(
                    id,
                    Ingredient {
                        id,
                        name: ingredient.name,
                        measurement_unit: ingredient.measurement_unit,
                    },
                );
                inserted += 1;
            }

            Ok(inserted)
        })
        .await
    }

    async fn get_ingredient(&self, id: Id) -> Result<Option<Ingredient>, Error> {
        Ok(self.read(|t| t.ingredients.get(&id).cloned()).await)
    }

    async fn search_ingredients(&self, prefix: &str) -> Result<Vec<Ingredient>, Error> {
        let prefix = prefix.to_lowercase();
        let mut rows: Vec<Ingredient> = self
            .read(|t| {
                t.ingredients
                    .values()
                    .filter(|i| i.name.to_lowercase().starts_with(&prefix))
                    .cloned()
                    .collect()
            })
            .await;

        rows.sort_by(|a, b| {
            by_name(&a.name, &b.name).then_with(|| a.measurement_unit.cmp(&b.measurement_unit))
        });

        Ok(rows)
    }

    async fn missing_ingredients(&self, ids: &[Id]) -> Result<Vec<Id>, Error> {
        Ok(self
            .read(|t| {
                ids.iter()
                    .filter(|id| !t.ingredients.contains_key(id))
                    .copied()
                    .collect()
            })
            .await)
    }

    async fn insert_tag(&self, tag: NewTag) -> Result<Tag, Error> {
        self.transaction(|t| {
            let taken = t
                .tags
                .values()
                .any(|x| x.name == tag.name || x.color == tag.color || x.slug == tag.slug);
            if taken {
                return Err(Error::conflict("Tag with this name, color or slug exists"));
            }

            t.last_tag_id += 1;
            let row = Tag {
                id: t.last_tag_id,
                name: tag.name,
                color: tag.color,
                slug: tag.slug,
            };
            t.tags.insert(row.id, row.clone());

            Ok(row)
        })
        .await
    }

    async fn get_tag(&self, id: Id) -> Result<Option<Tag>, Error> {
        Ok(self.read(|t| t.tags.get(&id).cloned()).await)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        let mut rows: Vec<Tag> = self.read(|t| t.tags.values().cloned().collect()).await;
        rows.sort_by(|a, b| by_name(&a.name, &b.name));

        Ok(rows)
    }

    async fn missing_tags(&self, ids: &[Id]) -> Result<Vec<Id>, Error> {
        Ok(self
            .read(|t| {
                ids.iter()
                    .filter(|id| !t.tags.contains_key(id))
                    .copied()
                    .collect()
            })
            .await)
    }

    async fn insert_recipe(&self, author_id: Id, recipe: RecipeWrite) -> Result<Id, Error> {
        self.transaction(|t| {
            if !t.users.contains_key(&author_id) {
                return Err(Error::Conflict(format!("User {author_id} does not exist")));
            }
            if recipe.cooking_time <= 0 {
                return Err(Error::conflict("Cooking time must be positive"));
            }

            t.last_recipe_id += 1;
            let id = t.last_recipe_id;
            t.recipes.insert(
                id,
                Recipe {
                    id,
                    author_id,
                    name: recipe.name.clone(),
                    text: recipe.text.clone(),
                    cooking_time: recipe.cooking_time,
                    image: recipe.image.clone().unwrap_or_default(),
                    pub_date: Utc::now(),
                },
            );
            t.insert_links(id, &recipe)?;

            Ok(id)
        })
        .await
    }

    async fn replace_recipe(&self, id: Id, recipe: RecipeWrite) -> Result<(), Error> {
        self.transaction(|t| {
            if recipe.cooking_time <= 0 {
                return Err(Error::conflict("Cooking time must be positive"));
            }

            t.clear_links(id);
            t.insert_links(id, &recipe)?;

            let row = t
                .recipes
                .get_mut(&id)
                .ok_or_else(|| Error::not_found("No recipe exists with specified id"))?;
            row.name = recipe.name;
            row.text = recipe.text;
            row.cooking_time = recipe.cooking_time;
            if let Some(image) = recipe.image {
                row.image = image;
            }

            Ok(())
        })
        .await
    }

    async fn delete_recipe(&self, id: Id) -> Result<bool, Error> {
        self.transaction(|t| {
            if t.recipes.remove(&id).is_none() {
                return Ok(false);
            }

            t.clear_links(id);
            t.favorites.retain(|(_, recipe_id)| *recipe_id != id);
            t.shopping_carts.retain(|(_, recipe_id)| *recipe_id != id);

            Ok(true)
        })
        .await
    }

    async fn get_recipe(&self, id: Id) -> Result<Option<Recipe>, Error> {
        Ok(self.read(|t| t.recipes.get(&id).cloned()).await)
    }

    async fn recipe_parts(&self, recipe_id: Id) -> Result<Vec<RecipePart>, Error> {
        let mut rows: Vec<RecipePart> = self
            .read(|t| {
                t.recipe_ingredients
                    .iter()
                    .filter(|(id, _)| *id == recipe_id)
                    .filter_map(|(_, part)| {
                        t.ingredients.get(&part.id).map(|i| RecipePart {
                            id: i.id,
                            name: i.name.clone(),
                            measurement_unit: i.measurement_unit.clone(),
                            amount: part.amount,
                        })
                    })
                    .collect()
            })
            .await;
        rows.sort_by(|a, b| by_name(&a.name, &b.name));

        Ok(rows)
    }

    async fn recipe_tags(&self, recipe_id: Id) -> Result<Vec<Tag>, Error> {
        let mut rows: Vec<Tag> = self
            .read(|t| {
                t.recipe_tags
                    .iter()
                    .filter(|(id, _)| *id == recipe_id)
                    .filter_map(|(_, tag_id)| t.tags.get(tag_id).cloned())
                    .collect()
            })
            .await;
        rows.sort_by(|a, b| by_name(&a.name, &b.name));

        Ok(rows)
    }

    async fn filter_recipes(
        &self,
        filter: &RecipeFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Recipe>, i64), Error> {
        let mut rows: Vec<Recipe> = self
            .read(|t| {
                t.recipes
                    .values()
                    .filter(|r| filter.author.map(|a| r.author_id == a).unwrap_or(true))
                    .filter(|r| {
                        filter.tags.is_empty()
                            || t.recipe_tags.iter().any(|(recipe_id, tag_id)| {
                                *recipe_id == r.id
                                    && t.tags
                                        .get(tag_id)
                                        .map(|tag| filter.tags.contains(&tag.slug))
                                        .unwrap_or(false)
                            })
                    })
                    .filter(|r| {
                        filter
                            .favorited_by
                            .map(|user_id| t.favorites.contains(&(user_id, r.id)))
                            .unwrap_or(true)
                    })
                    .filter(|r| {
                        filter
                            .in_cart_of
                            .map(|user_id| t.shopping_carts.contains(&(user_id, r.id)))
                            .unwrap_or(true)
                    })
                    .cloned()
                    .collect()
            })
            .await;

        sort_newest_first(&mut rows);
        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();

        Ok((page, total))
    }

    async fn recipe_row_counts(&self, recipe_id: Id) -> Result<RecipeRowCounts, Error> {
        Ok(self
            .read(|t| RecipeRowCounts {
                ingredients: t
                    .recipe_ingredients
                    .iter()
                    .filter(|(id, _)| *id == recipe_id)
                    .count() as i64,
                tags: t
                    .recipe_tags
                    .iter()
                    .filter(|(id, _)| *id == recipe_id)
                    .count() as i64,
                favorites: t
                    .favorites
                    .iter()
                    .filter(|(_, id)| *id == recipe_id)
                    .count() as i64,
                shopping_carts: t
                    .shopping_carts
                    .iter()
                    .filter(|(_, id)| *id == recipe_id)
                    .count() as i64,
            })
            .await)
    }

    async fn insert_relation(
        &self,
        relation: RecipeRelation,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<(), Error> {
        self.transaction(|t| {
            t.ensure_user(user_id)?;
            t.ensure_recipe(recipe_id)?;

            if !t.relation_mut(relation).insert((user_id, recipe_id)) {
                return Err(Error::Conflict(format!(
                    "Recipe is already in {}",
                    relation.label()
                )));
            }

            Ok(())
        })
        .await
    }

    async fn delete_relation(
        &self,
        relation: RecipeRelation,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, Error> {
        self.transaction(|t| Ok(t.relation_mut(relation).remove(&(user_id, recipe_id))))
            .await
    }

    async fn has_relation(
        &self,
        relation: RecipeRelation,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, Error> {
        Ok(self
            .read(|t| t.relation(relation).contains(&(user_id, recipe_id)))
            .await)
    }

    async fn shopping_list(&self, user_id: Id) -> Result<Vec<ShoppingListEntry>, Error> {
        let mut rows: Vec<ShoppingListEntry> = self
            .read(|t| {
                let mut totals: BTreeMap<Id, i64> = BTreeMap::new();
                for (_, recipe_id) in t.shopping_carts.iter().filter(|(u, _)| *u == user_id) {
                    for (_, part) in t
                        .recipe_ingredients
                        .iter()
                        .filter(|(id, _)| id == recipe_id)
                    {
                        *totals.entry(part.id).or_insert(0) += part.amount as i64;
                    }
                }

                totals
                    .into_iter()
                    .filter_map(|(id, total_amount)| {
                        t.ingredients.get(&id).map(|i| ShoppingListEntry {
                            name: i.name.clone(),
                            measurement_unit: i.measurement_unit.clone(),
                            total_amount,
                        })
                    })
                    .collect()
            })
            .await;

        rows.sort_by(|a, b| {
            by_name(&a.name, &b.name).then_with(|| a.measurement_unit.cmp(&b.measurement_unit))
        });

        Ok(rows)
    }

    async fn insert_subscription(&self, user_id: Id, following_id: Id) -> Result<(), Error> {
        self.transaction(|t| {
            t.ensure_user(user_id)?;
            t.ensure_user(following_id)?;

            if user_id == following_id {
                return Err(Error::conflict("Cannot subscribe to yourself"));
            }
            if !t.subscriptions.insert((user_id, following_id)) {
                return Err(Error::conflict("Already subscribed to this user"));
            }

            Ok(())
        })
        .await
    }

    async fn delete_subscription(&self, user_id: Id, following_id: Id) -> Result<bool, Error> {
        self.transaction(|t| Ok(t.subscriptions.remove(&(user_id, following_id))))
            .await
    }

    async fn is_subscribed(&self, user_id: Id, following_id: Id) -> Result<bool, Error> {
        Ok(self
            .read(|t| t.subscriptions.contains(&(user_id, following_id)))
            .await)
    }

    async fn list_subscriptions(
        &self,
        user_id: Id,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), Error> {
        let mut rows: Vec<User> = self
            .read(|t| {
                t.subscriptions
                    .iter()
                    .filter(|(u, _)| *u == user_id)
                    .filter_map(|(_, following_id)| t.users.get(following_id).cloned())
                    .collect()
            })
            .await;

        rows.sort_by(|a, b| by_name(&a.username, &b.username));
        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();

        Ok((page, total))
    }

    async fn recipes_by_author(
        &self,
        author_id: Id,
        limit: Option<i64>,
    ) -> Result<Vec<Recipe>, Error> {
        let mut rows: Vec<Recipe> = self
            .read(|t| {
                t.recipes
                    .values()
                    .filter(|r| r.author_id == author_id)
                    .cloned()
                    .collect()
            })
            .await;

        sort_newest_first(&mut rows);
        if let Some(limit) = limit {
            rows.truncate(limit.max(0) as usize);
        }

        Ok(rows)
    }

    async fn count_recipes_by_author(&self, author_id: Id) -> Result<i64, Error> {
        Ok(self
            .read(|t| {
                t.recipes
                    .values()
                    .filter(|r| r.author_id == author_id)
                    .count() as i64
            })
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::UserRole;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            email: format!("{name}@example.com"),
            username: name.to_string(),
            first_name: String::from("Test"),
            last_name: String::from("User"),
            password: String::from("hash"),
            role: UserRole::User,
        }
    }

    fn write(ingredients: Vec<IngredientAmount>, tags: Vec<Id>) -> RecipeWrite {
        RecipeWrite {
            name: String::from("Soup"),
            text: String::from("Boil"),
            cooking_time: 10,
            image: Some(String::from("recipes/a.png")),
            ingredients,
            tags,
        }
    }

    #[tokio::test]
    async fn failed_write_leaves_tables_untouched() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("alice")).await.unwrap();
        store
            .insert_ingredients(vec![NewIngredient {
                name: String::from("Salt"),
                measurement_unit: String::from("g"),
            }])
            .await
            .unwrap();

        // second line references a missing ingredient
        let result = store
            .insert_recipe(
                user.id,
                write(
                    vec![
                        IngredientAmount { id: 1, amount: 5 },
                        IngredientAmount { id: 42, amount: 1 },
                    ],
                    vec![],
                ),
            )
            .await;

        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(store.count_recipes_by_author(user.id).await.unwrap(), 0);
        assert_eq!(store.recipe_row_counts(1).await.unwrap().ingredients, 0);
    }

    #[tokio::test]
    async fn dangling_references_in_recipe_writes_conflict() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("carol")).await.unwrap();
        store
            .insert_ingredients(vec![NewIngredient {
                name: String::from("Salt"),
                measurement_unit: String::from("g"),
            }])
            .await
            .unwrap();
        let salt = vec![IngredientAmount { id: 1, amount: 5 }];

        let result = store.insert_recipe(user.id + 1, write(salt.clone(), vec![])).await;
        assert!(matches!(result, Err(Error::Conflict(_))));

        let id = store
            .insert_recipe(user.id, write(salt.clone(), vec![]))
            .await
            .unwrap();

        let result = store.replace_recipe(id, write(salt, vec![9])).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(store.recipe_row_counts(id).await.unwrap().ingredients, 1);

        let result = store
            .replace_recipe(id + 1, write(vec![IngredientAmount { id: 1, amount: 5 }], vec![]))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn self_subscription_violates_check() {
        let store = MemoryStore::new();
        let user = store.insert_user(new_user("bob")).await.unwrap();

        let result = store.insert_subscription(user.id, user.id).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
        assert!(!store.is_subscribed(user.id, user.id).await.unwrap());
    }

    #[tokio::test]
    async fn names_sort_case_insensitively() {
        let store = MemoryStore::new();
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
    }

    #[tokio::test]
    async fn duplicate_ingredients_are_skipped_on_import() {
        let store = MemoryStore::new();
        let salt = NewIngredient {
            name: String::from("Salt"),
            measurement_unit: String::from("g"),
        };

        assert_eq!(store.insert_ingredients(vec![salt.clone()]).await.unwrap(), 1);
        assert_eq!(store.insert_ingredients(vec![salt]).await.unwrap(), 0);
    }
}
