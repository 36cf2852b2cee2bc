use axum::response::Html;
use minijinja::{Environment, Value, context};
use parley_types::models::Message;

use crate::error::ChatError;

/// Server-rendered HTML pages. Templates are compiled into the binary and
/// auto-escaped by file extension.
pub struct Pages {
    env: Environment<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("layout.html", include_str!("../templates/layout.html"))?;
        env.add_template("index.html", include_str!("../templates/index.html"))?;
        env.add_template("login.html", include_str!("../templates/login.html"))?;
        env.add_template("signup.html", include_str!("../templates/signup.html"))?;
        Ok(Self { env })
    }

    pub fn index(&self, username: &str, messages: &[Message]) -> Result<Html<String>, ChatError> {
        self.render("index.html", context! { username, messages })
    }

    pub fn login(&self) -> Result<Html<String>, ChatError> {
        self.render("login.html", context! {})
    }

    pub fn signup(&self) -> Result<Html<String>, ChatError> {
        self.render("signup.html", context! {})
    }

    fn render(&self, name: &str, ctx: Value) -> Result<Html<String>, ChatError> {
        self.env
            .get_template(name)
            .and_then(|tmpl| tmpl.render(ctx))
            .map(Html)
            .map_err(|e| ChatError::Internal(format!("rendering {name} failed: {e}")))
    }
}
