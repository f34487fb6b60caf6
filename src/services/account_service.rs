//! Account Service - user lookup and permission checks

use sea_orm::*;

use crate::models::user::{self, Entity as User};
use crate::models::user_permission::{self, Entity as UserPermission};

/// Permission codenames granted to a librarian account at bootstrap.
pub const LIBRARIAN_PERMISSIONS: [&str; 7] = [
    "mark_returned",
    "add_author",
    "change_author",
    "delete_author",
    "add_book",
    "change_book",
    "delete_book",
];

pub async fn find_by_username(
    db: &DatabaseConnection,
    username: &str,
) -> Result<Option<user::Model>, DbErr> {
    User::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await
}

pub async fn has_permission(
    db: &DatabaseConnection,
    user_id: i32,
    permission: &str,
) -> Result<bool, DbErr> {
    let count = UserPermission::find()
        .filter(user_permission::Column::UserId.eq(user_id))
        .filter(user_permission::Column::Permission.eq(permission))
        .count(db)
        .await?;
    Ok(count > 0)
}

pub async fn permissions_of(db: &DatabaseConnection, user_id: i32) -> Result<Vec<String>, DbErr> {
    let rows = UserPermission::find()
        .filter(user_permission::Column::UserId.eq(user_id))
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|p| p.permission).collect())
}

pub async fn grant_permission(
    db: &DatabaseConnection,
    user_id: i32,
    permission: &str,
) -> Result<(), DbErr> {
    let grant = user_permission::ActiveModel {
        user_id: Set(user_id),
        permission: Set(permission.to_owned()),
    };

    UserPermission::insert(grant)
        .on_conflict(
            sea_orm::sea_query::OnConflict::columns([
                user_permission::Column::UserId,
                user_permission::Column::Permission,
            ])
            .do_nothing()
            .to_owned(),
        )
        .do_nothing()
        .exec(db)
        .await?;

    Ok(())
}

pub async fn grant_librarian_permissions(
    db: &DatabaseConnection,
    user_id: i32,
) -> Result<(), DbErr> {
    for permission in LIBRARIAN_PERMISSIONS {
        grant_permission(db, user_id, permission).await?;
    }
    Ok(())
}
