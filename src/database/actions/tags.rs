use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    constants::MAX_NAME_LENGTH,
    database::{
        error::Error,
        schema::{Id, NewTag, Tag},
        store::Datastore,
    },
};

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

fn is_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn check_tag(tag: &NewTag) -> Result<(), Error> {
    let name = tag.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::validation("Invalid tag name"));
    }
    if !is_hex_color(&tag.color) {
        return Err(Error::validation("Tag color must look like #RRGGBB"));
    }
    if !is_slug(&tag.slug) || tag.slug.len() > MAX_NAME_LENGTH {
        return Err(Error::validation(
            "Tag slug may contain only letters, digits, - and _",
        ));
    }

    Ok(())
}

pub async fn create_tag(
    tag: NewTag,
    session: &SessionData,
    store: &dyn Datastore,
) -> Result<Tag, Error> {
    session.authenticate(ActionType::ManageReferenceData)?;
    check_tag(&tag)?;

    let tag = store
        .insert_tag(NewTag {
            name: tag.name.trim().to_string(),
            color: tag.color.to_uppercase(),
            slug: tag.slug,
        })
        .await
        .map_err(|e| match e {
            Error::Conflict(_) => Error::conflict("Tag with this name, color or slug exists"),
            e => e,
        })?;

    log::info!("Created tag {} ({})", tag.slug, tag.id);

    Ok(tag)
}

pub async fn get_tag(id: Id, store: &dyn Datastore) -> Result<Tag, Error> {
    store
        .get_tag(id)
        .await?
        .ok_or_else(|| Error::not_found("No tag exists with specified id"))
}

pub async fn list_tags(store: &dyn Datastore) -> Result<Vec<Tag>, Error> {
    store.list_tags().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(color: &str, slug: &str) -> NewTag {
        NewTag {
            name: String::from("Breakfast"),
            color: color.to_string(),
            slug: slug.to_string(),
        }
    }

    #[test]
    fn colors_and_slugs_are_checked() {
        assert!(check_tag(&tag("#E26C2D", "breakfast")).is_ok());
        assert!(check_tag(&tag("#e26c2d", "late_night-snack")).is_ok());
        assert!(check_tag(&tag("E26C2D", "breakfast")).is_err());
        assert!(check_tag(&tag("#E26C2G", "breakfast")).is_err());
        assert!(check_tag(&tag("#E26C2D", "break fast")).is_err());
        assert!(check_tag(&tag("#E26C2D", "")).is_err());
    }
}
