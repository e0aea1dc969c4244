use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    database::{error::Error, schema::ShoppingListEntry, store::Datastore},
};

/// Ingredient totals across the user's cart, one entry per ingredient.
pub async fn shopping_list(
    session: &SessionData,
    store: &dyn Datastore,
) -> Result<Vec<ShoppingListEntry>, Error> {
    session.authenticate(ActionType::ManageOwnRelations)?;
    store.shopping_list(session.user_id).await
}

pub fn render_shopping_list(username: &str, entries: &[ShoppingListEntry]) -> String {
    let lines: String = entries
        .iter()
        .map(|entry| {
            format!(
                "{} ({}) - {}\n",
                entry.name, entry.measurement_unit, entry.total_amount
            )
        })
        .collect();

    format!("Shopping list for {username}\n{lines}")
}

pub async fn download_shopping_list(
    session: &SessionData,
    store: &dyn Datastore,
) -> Result<String, Error> {
    let entries = shopping_list(session, store).await?;
    Ok(render_shopping_list(&session.username, &entries))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn lines_follow_header() {
        let entries = vec![
            ShoppingListEntry {
                name: String::from("Flour"),
                measurement_unit: String::from("g"),
                total_amount: 500,
            },
            ShoppingListEntry {
                name: String::from("Salt"),
                measurement_unit: String::from("g"),
                total_amount: 8,
            },
        ];

        assert_eq!(
            render_shopping_list("cook", &entries),
            "Shopping list for cook\nFlour (g) - 500\nSalt (g) - 8\n"
        );
    }

    #[test]
    fn empty_cart_renders_header_only() {
        assert_eq!(render_shopping_list("cook", &[]), "Shopping list for cook\n");
    }
}
