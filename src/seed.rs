use chrono::{Duration, Local};
use sea_orm::*;
use uuid::Uuid;

use crate::auth::hash_password;
use crate::models::{author, book, book_genre, book_instance, genre, language, user};
use crate::services::account_service;

/// Populate a demo catalog: two accounts (a librarian with the full
/// permission set and a member), a handful of authors/books, and copies
/// in mixed circulation states.
pub async fn seed_demo_data(db: &DatabaseConnection) -> Result<(), DbErr> {
    let now = chrono::Utc::now().to_rfc3339();

    // 1. Accounts
    let librarian_password = hash_password("librarian").unwrap_or_default();
    let member_password = hash_password("member").unwrap_or_default();

    let librarian = user::ActiveModel {
        username: Set("librarian".to_owned()),
        password_hash: Set(librarian_password),
        role: Set("librarian".to_owned()),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };

    let member = user::ActiveModel {
        username: Set("member".to_owned()),
        password_hash: Set(member_password),
        role: Set("member".to_owned()),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
        ..Default::default()
    };

    user::Entity::insert(librarian)
        .on_conflict(
            sea_orm::sea_query::OnConflict::column(user::Column::Username)
                .do_nothing()
                .to_owned(),
        )
        .do_nothing()
        .exec(db)
        .await?;

    user::Entity::insert(member)
        .on_conflict(
            sea_orm::sea_query::OnConflict::column(user::Column::Username)
                .do_nothing()
                .to_owned(),
        )
        .do_nothing()
        .exec(db)
        .await?;

    let librarian = account_service::find_by_username(db, "librarian").await?;
    let member = account_service::find_by_username(db, "member").await?;
    let (Some(librarian), Some(member)) = (librarian, member) else {
        return Ok(());
    };

    account_service::grant_librarian_permissions(db, librarian.id).await?;

    // 2. Vocabularies
    for name in ["Fantasy", "Science Fiction", "French Poetry", "Tutorial"] {
        let row = genre::ActiveModel {
            name: Set(name.to_owned()),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        };
        genre::Entity::insert(row)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(genre::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .do_nothing()
            .exec(db)
            .await?;
    }

    for name in ["English", "French"] {
        let row = language::ActiveModel {
            name: Set(name.to_owned()),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        };
        language::Entity::insert(row)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(language::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .do_nothing()
            .exec(db)
            .await?;
    }

    let english = language::Entity::find()
        .filter(language::Column::Name.eq("English"))
        .one(db)
        .await?;
    let Some(english) = english else {
        return Ok(());
    };

    let fantasy = genre::Entity::find()
        .filter(genre::Column::Name.eq("Fantasy"))
        .one(db)
        .await?;

    // 3. Authors and books
    let authors = [
        ("J.R.R.", "Tolkien", Some("1892-01-03"), Some("1973-09-02")),
        ("Ursula K.", "Le Guin", Some("1929-10-21"), Some("2018-01-22")),
        ("Frank", "Herbert", Some("1920-10-08"), Some("1986-02-11")),
    ];

    let mut author_ids = Vec::new();
    for (first_name, last_name, born, died) in authors {
        let row = author::ActiveModel {
            first_name: Set(first_name.to_owned()),
            last_name: Set(last_name.to_owned()),
            date_of_birth: Set(born.map(str::to_owned)),
            date_of_death: Set(died.map(str::to_owned)),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        };
        let res = author::Entity::insert(row).exec(db).await?;
        author_ids.push(res.last_insert_id);
    }

    let books = [
        ("The Hobbit", "978-0547928227", author_ids[0]),
        ("A Wizard of Earthsea", "978-0547773742", author_ids[1]),
        ("Dune", "978-0441172719", author_ids[2]),
    ];

    let mut book_ids = Vec::new();
    for (title, isbn, author_id) in books {
        let row = book::ActiveModel {
            title: Set(title.to_owned()),
            summary: Set(None),
            isbn: Set(Some(isbn.to_owned())),
            author_id: Set(author_id),
            language_id: Set(english.id),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        };
        let res = book::Entity::insert(row).exec(db).await?;
        book_ids.push(res.last_insert_id);
    }

    if let Some(fantasy) = fantasy {
        for book_id in [book_ids[0], book_ids[1]] {
            let link = book_genre::ActiveModel {
                book_id: Set(book_id),
                genre_id: Set(fantasy.id),
            };
            book_genre::Entity::insert(link)
                .on_conflict(
                    sea_orm::sea_query::OnConflict::columns([
                        book_genre::Column::BookId,
                        book_genre::Column::GenreId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .do_nothing()
                .exec(db)
                .await?;
        }
    }

    // 4. Copies in mixed states: shelf, maintenance, and an active loan
    let today = Local::now().date_naive();
    let statuses = [
        ("available", None, None),
        ("maintenance", None, None),
        (
            "on_loan",
            Some(member.id),
            Some((today + Duration::weeks(2)).format("%Y-%m-%d").to_string()),
        ),
    ];

    for book_id in &book_ids {
        for (status, borrower_id, due_back) in statuses.clone() {
            let copy = book_instance::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                book_id: Set(*book_id),
                imprint: Set("Demo Imprint, 2020".to_owned()),
                due_back: Set(due_back),
                status: Set(status.to_owned()),
                borrower_id: Set(borrower_id),
                created_at: Set(now.clone()),
                updated_at: Set(now.clone()),
            };
            book_instance::Entity::insert(copy).exec(db).await?;
        }
    }

    Ok(())
}
