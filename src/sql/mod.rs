//! SQL handling for layer queries.
//!
//! Layer SQL written for the renderer may reference values that only exist
//! at tile-render time, such as the tile bounding box or the scale
//! denominator. Such a query cannot be planned on its own. [`sanitize`]
//! replaces every renderer token with an inert literal so the query can be
//! analyzed structurally by the database outside a render context.
//!
//! | token                 | replacement                |
//! |-----------------------|----------------------------|
//! | `!bbox!`              | `ST_MakeEnvelope(0,0,0,0)` |
//! | `!scale_denominator!` | `0`                        |
//! | `!pixel_width!`       | `1`                        |
//! | `!pixel_height!`      | `1`                        |
//!
//! The [`query_tables`] submodule builds on this to resolve the tables a
//! query depends on and when they were last modified.

pub mod query_tables;

pub use query_tables::{
    AffectedTables, MissingMetadataPolicy, QueryRunner, QueryTablesApi, Row, parse_table_list,
};

/// Bounding-box token substituted by the renderer.
pub const BBOX_TOKEN: &str = "!bbox!";
/// Scale-denominator token substituted by the renderer.
pub const SCALE_DENOMINATOR_TOKEN: &str = "!scale_denominator!";
/// Pixel-width token substituted by the renderer.
pub const PIXEL_WIDTH_TOKEN: &str = "!pixel_width!";
/// Pixel-height token substituted by the renderer.
pub const PIXEL_HEIGHT_TOKEN: &str = "!pixel_height!";

/// Renderer tokens and their inert replacements, applied in order.
///
/// No replacement contains a `!`, so substituting one token can never
/// produce another.
pub static RENDER_TOKEN_REPLACEMENTS: [(&str, &str); 4] = [
    (BBOX_TOKEN, "ST_MakeEnvelope(0,0,0,0)"),
    (SCALE_DENOMINATOR_TOKEN, "0"),
    (PIXEL_WIDTH_TOKEN, "1"),
    (PIXEL_HEIGHT_TOKEN, "1"),
];

/// Replace renderer-only tokens with inert SQL literals.
///
/// Matching is exact and case-sensitive; any other text, including
/// differently-cased lookalikes, is left untouched. Input without tokens is
/// returned unchanged.
///
/// # Examples
///
/// ```rust
/// use namedmaps::sql::sanitize;
///
/// let sql = "SELECT * FROM roads WHERE ST_Intersects(geom, !bbox!)";
/// assert_eq!(
///     sanitize(sql),
///     "SELECT * FROM roads WHERE ST_Intersects(geom, ST_MakeEnvelope(0,0,0,0))"
/// );
/// ```
#[must_use]
pub fn sanitize(sql: &str) -> String {
    RENDER_TOKEN_REPLACEMENTS
        .iter()
        .fold(sql.to_string(), |acc, (token, replacement)| acc.replace(token, replacement))
}

/// Whether `sql` references any renderer-only token.
#[must_use]
pub fn contains_render_tokens(sql: &str) -> bool {
    RENDER_TOKEN_REPLACEMENTS.iter().any(|(token, _)| sql.contains(token))
}
