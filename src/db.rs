use anyhow::anyhow;
use once_cell::sync::Lazy;
use sqlx::{Executor, PgPool, Postgres};
use sqlx::migrate::{MigrateError, Migrator};

use crate::error::{LibError, Result};
use crate::models::{ParentChildRow, PersonRow, TreeId, TreeRows, UnionRow};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_family_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::database(public, anyhow!(err))
}

pub async fn find_persons_by_tree_id<'e, E>(executor: E, tree_id: TreeId) -> Result<Vec<PersonRow>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, PersonRow>(
        r#"
        SELECT
            id,
            tree_id,
            first_name,
            last_name,
            maiden_name,
            gender,
            is_living,
            date_of_birth,
            date_of_death,
            notes,
            avatar_url,
            created_at,
            updated_at
        FROM family.person
        WHERE tree_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(tree_id.0)
    .fetch_all(executor)
    .await
    .map_err(|err| db_err("Failed to query persons", err))
}

pub async fn find_unions_by_tree_id<'e, E>(executor: E, tree_id: TreeId) -> Result<Vec<UnionRow>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, UnionRow>(
        r#"
        SELECT
            id,
            tree_id,
            partner1_id,
            partner2_id,
            union_type,
            status,
            start_date,
            end_date,
            created_at,
            updated_at
        FROM family."union"
        WHERE tree_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(tree_id.0)
    .fetch_all(executor)
    .await
    .map_err(|err| db_err("Failed to query unions", err))
}

/// Parent-child rows carry no tree id; both ends must belong to the tree.
pub async fn find_parent_child_by_tree_id<'e, E>(
    executor: E,
    tree_id: TreeId,
) -> Result<Vec<ParentChildRow>>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, ParentChildRow>(
        r#"
        SELECT
            pc.id,
            pc.parent_id,
            pc.child_id,
            pc.relationship_type,
            pc.created_at
        FROM family.parent_child pc
        JOIN family.person parent ON parent.id = pc.parent_id
        JOIN family.person child ON child.id = pc.child_id
        WHERE parent.tree_id = $1
          AND child.tree_id = $1
        ORDER BY pc.id ASC
        "#,
    )
    .bind(tree_id.0)
    .fetch_all(executor)
    .await
    .map_err(|err| db_err("Failed to query parent-child links", err))
}

/// Reads every row of a tree inside one transaction so the three sets agree.
pub async fn load_tree_rows(pool: &PgPool, tree_id: TreeId) -> Result<TreeRows> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| db_err("Failed to begin transaction", err))?;

    let persons = find_persons_by_tree_id(&mut *tx, tree_id).await?;
    let unions = find_unions_by_tree_id(&mut *tx, tree_id).await?;
    let links = find_parent_child_by_tree_id(&mut *tx, tree_id).await?;

    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit transaction", err))?;

    if persons.is_empty() {
        return Err(LibError::not_found(
            "Tree not found",
            anyhow!("tree {} has no persons", tree_id),
        ));
    }

    tracing::debug!(
        tree_id = %tree_id,
        persons = persons.len(),
        unions = unions.len(),
        links = links.len(),
        "tree rows loaded"
    );
    Ok(TreeRows {
        persons,
        unions,
        links,
    })
}
