//! Template fixtures.

use serde_json::{Value, json};

use crate::template::Template;

/// Layergroup with a single layer reading `sql`.
pub fn layergroup(sql: &str) -> Value {
    json!({
        "version": "1.0.1",
        "layers": [{
            "type": "cartodb",
            "options": {
                "sql": sql,
                "cartocss": "#layer { polygon-fill: red; }",
                "cartocss_version": "2.0.1"
            }
        }]
    })
}

/// Open template named `name` over the `parcels` table.
pub fn open_template(name: &str) -> Template {
    from_value(json!({
        "version": "0.0.1",
        "name": name,
        "auth": { "method": "open" },
        "layergroup": layergroup("SELECT * FROM parcels WHERE the_geom && !bbox!")
    }))
}

/// Template named `name` accepting only `token`.
pub fn token_template(name: &str, token: &str) -> Template {
    from_value(json!({
        "version": "0.0.1",
        "name": name,
        "auth": { "method": "token", "valid_tokens": [token] },
        "layergroup": layergroup("SELECT * FROM parcels")
    }))
}

/// Open template with a colored, zoom-filtered layer.
///
/// `color` defaults to `red`; `min_area` has no default.
pub fn parameterized_template(name: &str) -> Template {
    from_value(json!({
        "version": "0.0.1",
        "name": name,
        "auth": { "method": "open" },
        "placeholders": {
            "color": { "type": "css_color", "default": "red" },
            "min_area": { "type": "number" }
        },
        "layergroup": {
            "version": "1.0.1",
            "layers": [{
                "type": "cartodb",
                "options": {
                    "sql": "SELECT * FROM parcels WHERE area > <%= min_area %>",
                    "cartocss": "#layer { polygon-fill: <%= color %>; }",
                    "cartocss_version": "2.0.1"
                }
            }]
        }
    }))
}

fn from_value(value: Value) -> Template {
    serde_json::from_value(value).unwrap_or_else(|e| panic!("invalid fixture template: {e}"))
}
