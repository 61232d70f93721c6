use crate::submission::character::Character;
use crate::submission::SubmissionResult;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct CharacterRow {
    id: Uuid,
    user_snowflake: i64,
    template: String,
    name: String,
}

#[derive(sqlx::FromRow)]
struct FieldRow {
    character_id: Uuid,
    label: String,
    value: String,
}

impl CharacterRow {
    fn into_character(self, fields: &[FieldRow]) -> Character {
        Character {
            id: self.id,
            user_id: self.user_snowflake as u64,
            template: self.template,
            name: self.name,
            fields: fields
                .iter()
                .filter(|field| field.character_id == self.id)
                .map(|field| (field.label.clone(), field.value.clone()))
                .collect(),
        }
    }
}

async fn insert_fields(
    tx: &mut Transaction<'_, Postgres>,
    character_id: Uuid,
    fields: &[(String, String)],
) -> Result<(), sqlx::Error> {
    for (position, (label, value)) in fields.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO character_fields (character_id, position, label, value)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(character_id)
        .bind(position as i32)
        .bind(label)
        .bind(value)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn get_fields(character_id: Uuid, pool: &PgPool) -> Result<Vec<FieldRow>, sqlx::Error> {
    sqlx::query_as::<_, FieldRow>(
        r#"
        SELECT character_id, label, value
        FROM character_fields
        WHERE character_id = $1
        ORDER BY position
        "#,
    )
    .bind(character_id)
    .fetch_all(pool)
    .await
}

const SEARCH_LIMIT: i64 = 250;

/// Whether a write failed because the author already has a character by
/// that name.
pub fn is_name_taken(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|e| e.is_unique_violation())
}

pub async fn insert_character(
    result: &SubmissionResult,
    pool: PgPool,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO characters (id, user_snowflake, template, name)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(id)
    .bind(result.author_id as i64)
    .bind(&result.template)
    .bind(result.name())
    .execute(&mut *tx)
    .await?;

    insert_fields(&mut tx, id, &result.fields).await?;

    tx.commit().await?;

    Ok(id)
}

/// Replaces a character's sheet. Returns `false` if the author does not own
/// a character with that id.
pub async fn update_character(
    id: Uuid,
    result: &SubmissionResult,
    pool: PgPool,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE characters
        SET template = $3, name = $4
        WHERE id = $1 AND user_snowflake = $2
        "#,
    )
    .bind(id)
    .bind(result.author_id as i64)
    .bind(&result.template)
    .bind(result.name())
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query("DELETE FROM character_fields WHERE character_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    insert_fields(&mut tx, id, &result.fields).await?;

    tx.commit().await?;

    Ok(true)
}

pub async fn get_characters_for_user(
    user_id: u64,
    pool: PgPool,
) -> Result<Vec<Character>, sqlx::Error> {
    let user_id = user_id as i64;

    let rows = sqlx::query_as::<_, CharacterRow>(
        r#"
        SELECT id, user_snowflake, template, name
        FROM characters
        WHERE user_snowflake = $1
        ORDER BY name
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    let fields = sqlx::query_as::<_, FieldRow>(
        r#"
        SELECT f.character_id, f.label, f.value
        FROM character_fields f
        JOIN characters c ON c.id = f.character_id
        WHERE c.user_snowflake = $1
        ORDER BY f.character_id, f.position
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| row.into_character(&fields))
        .collect())
}

pub async fn get_character_names_for_user(
    user_id: u64,
    pool: PgPool,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT name
        FROM characters
        WHERE user_snowflake = $1
        ORDER BY name
        "#,
    )
    .bind(user_id as i64)
    .fetch_all(&pool)
    .await
}

pub async fn get_character_by_name(
    user_id: u64,
    name: &str,
    pool: PgPool,
) -> Result<Option<Character>, sqlx::Error> {
    let row = sqlx::query_as::<_, CharacterRow>(
        r#"
        SELECT id, user_snowflake, template, name
        FROM characters
        WHERE user_snowflake = $1 AND lower(name) = lower($2)
        "#,
    )
    .bind(user_id as i64)
    .bind(name.trim())
    .fetch_optional(&pool)
    .await?;

    match row {
        Some(row) => {
            let fields = get_fields(row.id, &pool).await?;
            Ok(Some(row.into_character(&fields)))
        }
        None => Ok(None),
    }
}

/// Characters whose name contains `query`, optionally limited to one owner,
/// ordered by owner and then name.
pub async fn search_characters(
    query: &str,
    user_id: Option<u64>,
    pool: PgPool,
) -> Result<Vec<Character>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CharacterRow>(
        r#"
        SELECT id, user_snowflake, template, name
        FROM characters
        WHERE strpos(lower(name), lower($1)) > 0
          AND ($2::BIGINT IS NULL OR user_snowflake = $2)
        ORDER BY user_snowflake, name
        LIMIT $3
        "#,
    )
    .bind(query.trim())
    .bind(user_id.map(|id| id as i64))
    .bind(SEARCH_LIMIT)
    .fetch_all(&pool)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let fields = sqlx::query_as::<_, FieldRow>(
        r#"
        SELECT character_id, label, value
        FROM character_fields
        WHERE character_id = ANY($1)
        ORDER BY character_id, position
        "#,
    )
    .bind(&ids)
    .fetch_all(&pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| row.into_character(&fields))
        .collect())
}

/// Deletes one of the user's characters and returns it.
pub async fn delete_character_by_name(
    user_id: u64,
    name: &str,
    pool: PgPool,
) -> Result<Option<Character>, sqlx::Error> {
    let character = match get_character_by_name(user_id, name, pool.clone()).await? {
        Some(character) => character,
        None => return Ok(None),
    };

    sqlx::query("DELETE FROM characters WHERE id = $1 AND user_snowflake = $2")
        .bind(character.id)
        .bind(user_id as i64)
        .execute(&pool)
        .await?;

    Ok(Some(character))
}
