//! Node repository: every SQL statement touching the `nodes` table.
//!
//! All methods take a `&mut SqliteConnection` supplied by the caller, so
//! the transaction boundary is always owned by the layer above. The
//! nested-set bound arithmetic primitives (`open_gap`, `close_gap`,
//! `detach_subtree`, `reattach_subtree`) live here and nowhere else; the
//! tree service sequences them, no other component touches bounds.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use legajo_core::error::{AppError, ErrorKind};
use legajo_core::result::AppResult;
use legajo_core::types::pagination::PageRequest;
use legajo_core::types::sorting::SortField;
use legajo_entity::node::{IncludeStates, NewNode, Node, NodeFilter, NodeType};

/// Repository for node CRUD and nested-set tree queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeRepository;

/// SQL predicate for an [`IncludeStates`] selection.
fn state_predicate(states: IncludeStates) -> &'static str {
    match states {
        IncludeStates::ActiveOnly => "deleted_at IS NULL",
        IncludeStates::TrashedOnly => "deleted_at IS NOT NULL",
        IncludeStates::All => "1 = 1",
    }
}

/// Map a caller-supplied sort field onto a whitelisted column.
fn sort_column(field: &str) -> &'static str {
    match field {
        "name" => "name",
        "path" => "path",
        "size" => "size",
        "extension" => "extension",
        "created_at" => "created_at",
        "updated_at" => "updated_at",
        _ => "name",
    }
}

/// Append the [`NodeFilter`] conditions to a query builder.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &NodeFilter) {
    if filter.visible_only {
        qb.push(" AND is_visible = 1");
    }
    if let Some(node_type) = filter.node_type {
        qb.push(" AND node_type = ").push_bind(match node_type {
            NodeType::Folder => "folder",
            NodeType::File => "file",
        });
    }
    if let Some(term) = &filter.search {
        let pattern = format!("%{term}%");
        qb.push(" AND (name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR description LIKE ")
            .push_bind(pattern.clone())
            .push(" OR path LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(access) = filter.access_level_id {
        qb.push(" AND access_level_id = ").push_bind(access);
    }
    if let Some(security) = filter.security_level_id {
        qb.push(" AND security_level_id = ").push_bind(security);
    }
    if let Some(extension) = &filter.extension {
        qb.push(" AND extension = ").push_bind(extension.to_lowercase());
    }
    if let Some(owner) = filter.owner_id {
        qb.push(" AND owner_id = ").push_bind(owner);
    }
    if let Some(creator) = filter.created_by {
        qb.push(" AND created_by = ").push_bind(creator);
    }
}

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, context, e)
}

impl NodeRepository {
    /// Insert a node row. Bounds must already be valid; the caller opens
    /// the gap first.
    pub async fn insert(&self, conn: &mut SqliteConnection, node: &NewNode) -> AppResult<Node> {
        let now = Utc::now();
        sqlx::query_as::<_, Node>(
            "INSERT INTO nodes (node_type, name, path, hash, size, extension, owner_id, \
             created_by, access_level_id, security_level_id, is_visible, is_erasable, \
             description, lft, rgt, parent_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING *",
        )
        .bind(node.node_type)
        .bind(&node.name)
        .bind(&node.path)
        .bind(node.hash)
        .bind(node.size)
        .bind(&node.extension)
        .bind(node.owner_id)
        .bind(node.created_by)
        .bind(node.access_level_id)
        .bind(node.security_level_id)
        .bind(node.is_visible)
        .bind(node.is_erasable)
        .bind(&node.description)
        .bind(node.lft)
        .bind(node.rgt)
        .bind(node.parent_id)
        .bind(now)
        .bind(now)
        .fetch_one(conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db)
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                AppError::conflict(format!("Path '{}' already exists", node.path))
            }
            _ => AppError::with_source(ErrorKind::Database, "Failed to insert node", e),
        })
    }

    /// Find a node by id.
    pub async fn find_by_id(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        states: IncludeStates,
    ) -> AppResult<Option<Node>> {
        sqlx::query_as::<_, Node>(&format!(
            "SELECT * FROM nodes WHERE id = $1 AND {}",
            state_predicate(states)
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(db_err("Failed to find node by id"))
    }

    /// Find a node by its immutable hash.
    pub async fn find_by_hash(
        &self,
        conn: &mut SqliteConnection,
        hash: Uuid,
        states: IncludeStates,
    ) -> AppResult<Option<Node>> {
        sqlx::query_as::<_, Node>(&format!(
            "SELECT * FROM nodes WHERE hash = $1 AND {}",
            state_predicate(states)
        ))
        .bind(hash)
        .fetch_optional(conn)
        .await
        .map_err(db_err("Failed to find node by hash"))
    }

    /// Find a node by logical path.
    pub async fn find_by_path(
        &self,
        conn: &mut SqliteConnection,
        path: &str,
        states: IncludeStates,
    ) -> AppResult<Option<Node>> {
        sqlx::query_as::<_, Node>(&format!(
            "SELECT * FROM nodes WHERE path = $1 AND {}",
            state_predicate(states)
        ))
        .bind(path)
        .fetch_optional(conn)
        .await
        .map_err(db_err("Failed to find node by path"))
    }

    /// Bulk-load nodes for a set of paths in one query.
    pub async fn find_by_paths(
        &self,
        conn: &mut SqliteConnection,
        paths: &[String],
        states: IncludeStates,
    ) -> AppResult<Vec<Node>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM nodes WHERE ");
        qb.push(state_predicate(states)).push(" AND path IN (");
        let mut separated = qb.separated(", ");
        for path in paths {
            separated.push_bind(path);
        }
        qb.push(") ORDER BY lft ASC");
        qb.build_query_as::<Node>()
            .fetch_all(conn)
            .await
            .map_err(db_err("Failed to load nodes by paths"))
    }

    /// Largest right bound in the forest (0 when empty).
    pub async fn max_right(&self, conn: &mut SqliteConnection) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(rgt), 0) FROM nodes")
            .fetch_one(conn)
            .await
            .map_err(db_err("Failed to read max right bound"))
    }

    /// Shift every bound at or beyond `at` right by `width`, making room
    /// for a subtree of that width.
    pub async fn open_gap(
        &self,
        conn: &mut SqliteConnection,
        at: i64,
        width: i64,
    ) -> AppResult<()> {
        sqlx::query("UPDATE nodes SET rgt = rgt + $1 WHERE rgt >= $2")
            .bind(width)
            .bind(at)
            .execute(&mut *conn)
            .await
            .map_err(db_err("Failed to open gap (rgt)"))?;
        sqlx::query("UPDATE nodes SET lft = lft + $1 WHERE lft >= $2")
            .bind(width)
            .bind(at)
            .execute(conn)
            .await
            .map_err(db_err("Failed to open gap (lft)"))?;
        Ok(())
    }

    /// Shift every bound beyond `after` left by `width`, closing the hole
    /// a removed subtree left behind.
    pub async fn close_gap(
        &self,
        conn: &mut SqliteConnection,
        after: i64,
        width: i64,
    ) -> AppResult<()> {
        sqlx::query("UPDATE nodes SET rgt = rgt - $1 WHERE rgt > $2")
            .bind(width)
            .bind(after)
            .execute(&mut *conn)
            .await
            .map_err(db_err("Failed to close gap (rgt)"))?;
        sqlx::query("UPDATE nodes SET lft = lft - $1 WHERE lft > $2")
            .bind(width)
            .bind(after)
            .execute(conn)
            .await
            .map_err(db_err("Failed to close gap (lft)"))?;
        Ok(())
    }

    /// Park a subtree outside the numbering space by negating its bounds.
    ///
    /// At most one subtree may be detached at a time within a transaction;
    /// [`Self::reattach_subtree`] picks it up by its negative bounds.
    pub async fn detach_subtree(
        &self,
        conn: &mut SqliteConnection,
        lft: i64,
        rgt: i64,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE nodes SET lft = -lft, rgt = -rgt WHERE lft >= $1 AND rgt <= $2",
        )
        .bind(lft)
        .bind(rgt)
        .execute(conn)
        .await
        .map_err(db_err("Failed to detach subtree"))?;
        Ok(result.rows_affected())
    }

    /// Restore the detached subtree, shifting every bound by `offset`.
    pub async fn reattach_subtree(
        &self,
        conn: &mut SqliteConnection,
        offset: i64,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE nodes SET lft = -lft + $1, rgt = -rgt + $1 WHERE lft < 0",
        )
        .bind(offset)
        .execute(conn)
        .await
        .map_err(db_err("Failed to reattach subtree"))?;
        Ok(result.rows_affected())
    }

    /// Update a node's name and path after a move or rename.
    pub async fn update_path(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        name: &str,
        path: &str,
        parent_id: Option<i64>,
    ) -> AppResult<Node> {
        sqlx::query_as::<_, Node>(
            "UPDATE nodes SET name = $2, path = $3, parent_id = $4, updated_at = $5 \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(path)
        .bind(parent_id)
        .bind(Utc::now())
        .fetch_optional(conn)
        .await
        .map_err(db_err("Failed to update node path"))?
        .ok_or_else(|| AppError::not_found(format!("Node {id} not found")))
    }

    /// Rewrite descendant paths after their ancestor moved: the old path
    /// prefix is replaced with the new one. Bounds identify the subtree.
    pub async fn rewrite_descendant_paths(
        &self,
        conn: &mut SqliteConnection,
        lft: i64,
        rgt: i64,
        old_prefix: &str,
        new_prefix: &str,
    ) -> AppResult<u64> {
        // substr() counts characters, as does chars().count().
        let start = old_prefix.chars().count() as i64 + 1;
        let result = sqlx::query(
            "UPDATE nodes SET path = $1 || substr(path, $2), updated_at = $3 \
             WHERE lft > $4 AND rgt < $5",
        )
        .bind(new_prefix)
        .bind(start)
        .bind(Utc::now())
        .bind(lft)
        .bind(rgt)
        .execute(conn)
        .await
        .map_err(db_err("Failed to rewrite descendant paths"))?;
        Ok(result.rows_affected())
    }

    /// Update a file node's size (content overwrite).
    pub async fn update_size(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        size: i64,
    ) -> AppResult<()> {
        sqlx::query("UPDATE nodes SET size = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(size)
            .bind(Utc::now())
            .execute(conn)
            .await
            .map_err(db_err("Failed to update node size"))?;
        Ok(())
    }

    /// Soft-delete an entire subtree (bounds inclusive). Already-trashed
    /// rows keep their original deletion timestamp.
    pub async fn soft_delete_subtree(
        &self,
        conn: &mut SqliteConnection,
        lft: i64,
        rgt: i64,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE nodes SET deleted_at = $1, updated_at = $1 \
             WHERE lft >= $2 AND rgt <= $3 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(lft)
        .bind(rgt)
        .execute(conn)
        .await
        .map_err(db_err("Failed to soft-delete subtree"))?;
        Ok(result.rows_affected())
    }

    /// Clear the soft-delete marker on an entire subtree.
    pub async fn restore_subtree(
        &self,
        conn: &mut SqliteConnection,
        lft: i64,
        rgt: i64,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE nodes SET deleted_at = NULL, updated_at = $1 \
             WHERE lft >= $2 AND rgt <= $3 AND deleted_at IS NOT NULL",
        )
        .bind(Utc::now())
        .bind(lft)
        .bind(rgt)
        .execute(conn)
        .await
        .map_err(db_err("Failed to restore subtree"))?;
        Ok(result.rows_affected())
    }

    /// Permanently delete a subtree. The caller closes the gap afterwards.
    pub async fn hard_delete_subtree(
        &self,
        conn: &mut SqliteConnection,
        lft: i64,
        rgt: i64,
    ) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM nodes WHERE lft >= $1 AND rgt <= $2")
            .bind(lft)
            .bind(rgt)
            .execute(conn)
            .await
            .map_err(db_err("Failed to delete subtree"))?;
        Ok(result.rows_affected())
    }

    /// All strict descendants of the given bounds, in tree order.
    pub async fn descendants(
        &self,
        conn: &mut SqliteConnection,
        lft: i64,
        rgt: i64,
        states: IncludeStates,
    ) -> AppResult<Vec<Node>> {
        sqlx::query_as::<_, Node>(&format!(
            "SELECT * FROM nodes WHERE lft > $1 AND rgt < $2 AND {} ORDER BY lft ASC",
            state_predicate(states)
        ))
        .bind(lft)
        .bind(rgt)
        .fetch_all(conn)
        .await
        .map_err(db_err("Failed to list descendants"))
    }

    /// Direct children of a folder with filters, sorting and optional
    /// pagination. Returns the page plus the filtered total.
    pub async fn children(
        &self,
        conn: &mut SqliteConnection,
        parent_id: i64,
        filter: &NodeFilter,
        sort: Option<&SortField>,
        page: Option<&PageRequest>,
    ) -> AppResult<(Vec<Node>, u64)> {
        let mut count_qb =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM nodes WHERE deleted_at IS NULL");
        count_qb.push(" AND parent_id = ").push_bind(parent_id);
        push_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err("Failed to count children"))?;

        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT * FROM nodes WHERE deleted_at IS NULL");
        qb.push(" AND parent_id = ").push_bind(parent_id);
        push_filter(&mut qb, filter);

        // Folders always group before files, like a file manager.
        qb.push(" ORDER BY node_type = 'file' ASC, ");
        match sort {
            Some(sort) => {
                qb.push(sort_column(&sort.field))
                    .push(" ")
                    .push(sort.direction.as_sql());
            }
            None => {
                qb.push("name ASC");
            }
        }

        if let Some(page) = page {
            qb.push(" LIMIT ")
                .push_bind(page.limit() as i64)
                .push(" OFFSET ")
                .push_bind(page.offset() as i64);
        }

        let nodes = qb
            .build_query_as::<Node>()
            .fetch_all(conn)
            .await
            .map_err(db_err("Failed to list children"))?;

        Ok((nodes, total as u64))
    }

    /// Free-text search over active nodes, optionally scoped to a subtree
    /// by nested-set bounds, capped at `limit` results.
    pub async fn search(
        &self,
        conn: &mut SqliteConnection,
        term: &str,
        scope: Option<(i64, i64)>,
        filter: &NodeFilter,
        limit: u32,
    ) -> AppResult<Vec<Node>> {
        let pattern = format!("%{term}%");
        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT * FROM nodes WHERE deleted_at IS NULL");
        qb.push(" AND (name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR description LIKE ")
            .push_bind(pattern.clone())
            .push(" OR path LIKE ")
            .push_bind(pattern)
            .push(")");
        if let Some((lft, rgt)) = scope {
            qb.push(" AND lft > ")
                .push_bind(lft)
                .push(" AND rgt < ")
                .push_bind(rgt);
        }
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY path ASC LIMIT ").push_bind(limit as i64);

        qb.build_query_as::<Node>()
            .fetch_all(conn)
            .await
            .map_err(db_err("Failed to search nodes"))
    }

    /// One page of active folder nodes for batch synchronization.
    pub async fn folders_page(
        &self,
        conn: &mut SqliteConnection,
        prioritize_recent: bool,
        limit: u32,
        offset: u64,
    ) -> AppResult<Vec<Node>> {
        let order = if prioritize_recent {
            "updated_at DESC"
        } else {
            "lft ASC"
        };
        sqlx::query_as::<_, Node>(&format!(
            "SELECT * FROM nodes WHERE node_type = 'folder' AND deleted_at IS NULL \
             ORDER BY {order} LIMIT $1 OFFSET $2",
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(conn)
        .await
        .map_err(db_err("Failed to page folders"))
    }

    /// Count nodes in a given state.
    pub async fn count(
        &self,
        conn: &mut SqliteConnection,
        states: IncludeStates,
    ) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM nodes WHERE {}",
            state_predicate(states)
        ))
        .fetch_one(conn)
        .await
        .map_err(db_err("Failed to count nodes"))?;
        Ok(count as u64)
    }
}
