//! HTML document shell around server-rendered markup.

/// Head content for the shell.
#[derive(Debug, Clone, Default)]
pub struct HeadContent {
    /// Page title.
    pub title: Option<String>,
    /// Meta tags.
    pub meta: Vec<(String, String)>,
    /// Link tags (stylesheets, etc.).
    pub links: Vec<String>,
    /// Inline scripts in head.
    pub scripts: Vec<String>,
}

impl HeadContent {
    /// Create new head content with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Add a meta tag.
    pub fn with_meta(mut self, name: &str, content: &str) -> Self {
        self.meta.push((name.to_string(), content.to_string()));
        self
    }

    /// Add a stylesheet link.
    pub fn with_stylesheet(mut self, href: &str) -> Self {
        self.links.push(format!(
            r#"<link rel="stylesheet" href="{}">"#,
            escape_html(href)
        ));
        self
    }

    /// Add a module preload hint for a client chunk.
    pub fn with_preload(mut self, href: &str) -> Self {
        self.links.push(format!(
            r#"<link rel="modulepreload" href="{}">"#,
            escape_html(href)
        ));
        self
    }

    /// Render head content to HTML.
    pub fn render(&self) -> String {
        let mut html = String::new();

        if let Some(title) = &self.title {
            html.push_str(&format!("<title>{}</title>\n", escape_html(title)));
        }

        for (name, content) in &self.meta {
            html.push_str(&format!(
                r#"<meta name="{}" content="{}">"#,
                escape_html(name),
                escape_html(content)
            ));
            html.push('\n');
        }

        for link in &self.links {
            html.push_str(link);
            html.push('\n');
        }

        for script in &self.scripts {
            html.push_str(&format!("<script>{}</script>\n", script));
        }

        html
    }
}

/// Document template for a server-rendered page.
#[derive(Debug, Clone)]
pub struct Shell {
    /// Include doctype declaration.
    pub doctype: bool,
    pub head: HeadContent,
    /// HTML before the page markup (opening body, root container).
    pub body_start: String,
    /// HTML after the page markup.
    pub body_end: String,
    /// Client entry script, if any.
    pub bootstrap: Option<String>,
}

impl Shell {
    /// Create a new shell with basic structure.
    pub fn new(head: HeadContent) -> Self {
        Self {
            doctype: true,
            head,
            body_start: "<body>\n<div id=\"tandem-root\">".to_string(),
            body_end: "</div>\n</body>\n</html>".to_string(),
            bootstrap: None,
        }
    }

    pub fn with_body_start(mut self, html: impl Into<String>) -> Self {
        self.body_start = html.into();
        self
    }

    pub fn with_body_end(mut self, html: impl Into<String>) -> Self {
        self.body_end = html.into();
        self
    }

    /// Set the client entry script.
    pub fn with_bootstrap(mut self, src: impl Into<String>) -> Self {
        self.bootstrap = Some(src.into());
        self
    }

    /// Render the opening part of the shell (before page markup).
    pub fn render_opening(&self) -> String {
        let mut html = String::new();

        if self.doctype {
            html.push_str("<!DOCTYPE html>\n");
        }

        html.push_str("<html>\n<head>\n");
        html.push_str(&self.head.render());
        html.push_str("</head>\n");
        html.push_str(&self.body_start);

        html
    }

    /// Render the closing part of the shell.
    ///
    /// `stream_url` is where the client entry fetches the frame stream
    /// used to hydrate the markup.
    pub fn render_closing(&self, stream_url: &str) -> String {
        let mut html = String::new();
        if let Some(src) = &self.bootstrap {
            html.push_str(&format!(
                r#"<script type="module" src="{}" data-tandem-stream="{}"></script>"#,
                escape_html(src),
                escape_html(stream_url)
            ));
            html.push('\n');
        }
        html.push_str(&self.body_end);
        html
    }

    /// Render a complete document around `body`.
    pub fn render_document(&self, body: &str, stream_url: &str) -> String {
        let mut html = self.render_opening();
        html.push_str(body);
        html.push_str(&self.render_closing(stream_url));
        html
    }
}

/// Prefix of the comment opening an island; the module id follows.
pub const ISLAND_OPEN_PREFIX: &str = "<!--tandem:island:";

/// Comment closing an island.
pub const ISLAND_CLOSE: &str = "<!--/tandem:island-->";

/// Comment opening the island of `module_id`.
pub fn island_open(module_id: &str) -> String {
    format!("{}{}-->", ISLAND_OPEN_PREFIX, module_id)
}

/// Escape text for HTML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_render() {
        let head = HeadContent::new("Shop & Co")
            .with_meta("viewport", "width=device-width")
            .with_stylesheet("/app.css");
        let html = head.render();

        assert!(html.contains("<title>Shop &amp; Co</title>"));
        assert!(html.contains(r#"<meta name="viewport" content="width=device-width">"#));
        assert!(html.contains(r#"href="/app.css""#));
    }

    #[test]
    fn test_document_layout() {
        let shell = Shell::new(HeadContent::new("Home")).with_bootstrap("/client.js");
        let html = shell.render_document("<p>hi</p>", "/?_rsc");

        assert!(html.starts_with("<!DOCTYPE html>"));
        let body = html.find("<p>hi</p>").unwrap();
        let script = html.find("data-tandem-stream=\"/?_rsc\"").unwrap();
        assert!(html.find("<div id=\"tandem-root\">").unwrap() < body);
        assert!(body < script);
        assert!(html.ends_with("</html>"));
    }

    #[test]
    fn test_no_bootstrap_without_entry() {
        let shell = Shell::new(HeadContent::default());
        assert!(!shell.render_closing("/x").contains("<script"));
    }
}
