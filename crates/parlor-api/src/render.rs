use anyhow::Result;
use axum::response::Html;
use tera::{Context, Tera};

/// Page templates, compiled into the binary.
const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("chat.html", include_str!("../templates/chat.html")),
];

/// Thin wrapper over Tera. Autoescaping is on for every `.html` template.
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())?;
        Ok(Self { tera })
    }

    pub fn render(&self, template: &str, context: &Context) -> Result<Html<String>> {
        Ok(Html(self.tera.render(template, context)?))
    }
}
