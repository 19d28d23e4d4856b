use tokio_postgres::types::ToSql;

use crate::posts::PostListFilter;

pub type SqlParams<'a> = Vec<&'a (dyn ToSql + Sync)>;

/// Returns "$1,$2,...,$n".
pub fn numbered_placeholders(amount: usize) -> String {
    (1..amount + 1)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Creates the WHERE section of a post listing query for the given filter, pushing the values it
/// refers to onto `params`. Expects the post table to be aliased as `p`.
/// Lifetime of parameter modifications tied to lifetime of the filter.
pub fn post_list_where<'a>(filter: &'a PostListFilter, params: &mut SqlParams<'a>) -> String {
    let mut query_conditions: Vec<String> = vec![
        "NOT p.is_draft".to_string(),
        "NOT p.is_processing".to_string(),
    ];

    if let Some(category) = &filter.category {
        params.push(category);
        query_conditions.push(format!("p.category = ${}", params.len()));
    }

    if let Some(owner_id) = &filter.owner_id {
        params.push(owner_id);
        query_conditions.push(format!("p.owner_id = ${}", params.len()));
    }

    if let Some(visibility) = &filter.visibility {
        params.push(visibility);
        query_conditions.push(format!("p.visibility = ${}", params.len()));
    }

    if let Some(viewer_id) = &filter.viewer_id {
        params.push(viewer_id);
        let viewer = format!("${}", params.len());

        query_conditions.push(format!(
            "(p.visibility = 'public' \
            OR p.owner_id = {viewer} \
            OR (p.visibility = 'followers' AND EXISTS (\
                SELECT 1 FROM follow f WHERE f.follower_id = {viewer} AND f.followee_id = p.owner_id)))"
        ));
    }

    format!("WHERE {}", query_conditions.join(" AND "))
}
