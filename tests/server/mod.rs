use actix_web::http::StatusCode;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Meta description between 70 and 160 characters
#[allow(dead_code)]
pub const DESCRIPTION: &str = "A practical guide to growing industrial hemp, covering licensing, soil preparation, planting and harvest.";

const FILLER: &str = "Industrial hemp grows quickly in well drained soil and rewards careful planning. ";

/// What the fixture site serves for one path
#[allow(dead_code)]
#[derive(Clone)]
pub enum Fixture {
    Html(String),
    Text(String),
    Status(u16),
    /// HTML served after a delay in milliseconds
    Slow(u64, String),
}

/// A page that passes every page-level rule unless told otherwise
#[allow(dead_code)]
pub struct FixturePage {
    path: String,
    title: String,
    description: Option<String>,
    links: Vec<String>,
}

#[allow(dead_code)]
impl FixturePage {
    /// `title` must be 30 to 60 characters and unique across the site
    pub fn healthy(path: &str, title: &str) -> Self {
        assert!((30..=60).contains(&title.chars().count()), "fixture title length");
        Self {
            path: path.to_string(),
            title: title.to_string(),
            description: Some(DESCRIPTION.to_string()),
            links: vec![],
        }
    }

    pub fn link(mut self, href: &str) -> Self {
        self.links.push(href.to_string());
        self
    }

    pub fn without_description(mut self) -> Self {
        self.description = None;
        self
    }

    pub fn render(&self) -> String {
        let description = self
            .description
            .as_ref()
            .map(|d| format!(r#"<meta name="description" content="{}">"#, d))
            .unwrap_or_default();
        let links: String = self
            .links
            .iter()
            .map(|href| format!(r#"<li><a href="{}">link</a></li>"#, href))
            .collect();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <title>{title}</title>
  {description}
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <link rel="canonical" href="{path}">
  <meta property="og:title" content="{title}">
  <script type="application/ld+json">{{"@context":"https://schema.org","@type":"WebPage"}}</script>
</head>
<body>
  <h1>{title}</h1>
  <img src="/images/field.jpg" alt="Hemp field">
  <p>{filler}</p>
  <ul>{links}</ul>
</body>
</html>"#,
            title = self.title,
            description = description,
            path = self.path,
            filler = FILLER.repeat(25),
            links = links,
        )
    }

    pub fn fixture(&self) -> (String, Fixture) {
        (self.path.clone(), Fixture::Html(self.render()))
    }
}

async fn respond(routes: Arc<HashMap<String, Fixture>>, req: HttpRequest) -> HttpResponse {
    match routes.get(req.path()) {
        Some(Fixture::Html(body)) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(body.clone()),
        Some(Fixture::Text(body)) => HttpResponse::Ok()
            .content_type("text/plain")
            .body(body.clone()),
        Some(Fixture::Status(code)) => {
            let status = StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            HttpResponse::build(status).body("error")
        }
        Some(Fixture::Slow(delay_ms, body)) => {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
            HttpResponse::Ok()
                .content_type("text/html; charset=utf-8")
                .body(body.clone())
        }
        None => HttpResponse::NotFound().body("Not Found"),
    }
}

/// Starts a site serving `routes` on an ephemeral port and returns its base
/// URL (no trailing slash)
#[allow(dead_code)]
pub async fn start_site(routes: Vec<(String, Fixture)>) -> String {
    let routes: Arc<HashMap<String, Fixture>> = Arc::new(routes.into_iter().collect());

    let http_server = HttpServer::new(move || {
        let routes = routes.clone();
        App::new().default_service(web::to(move |req: HttpRequest| respond(routes.clone(), req)))
    })
    .workers(2)
    .bind(("127.0.0.1", 0))
    .expect("Failed to bind test server");

    let addr = http_server
        .addrs()
        .first()
        .cloned()
        .expect("No address bound");
    let url = format!("http://{}", addr);

    let app_server = http_server.run();

    tokio::spawn(async move {
        if let Err(e) = app_server.await {
            eprintln!("Test server error: {}", e);
        }
    });

    url
}

/// Four pages: a healthy home page, a healthy about page, a page missing
/// its meta description, and a link to a 404
#[allow(dead_code)]
pub async fn start_standard_site() -> String {
    start_site(vec![
        FixturePage::healthy("/", "Hemp Farming Guide: Home Page Overview")
            .link("/about")
            .link("/missing-desc")
            .link("/broken")
            .link("https://other.example.org/elsewhere")
            .fixture(),
        FixturePage::healthy("/about", "About the Hemp Farming Guide Editors")
            .link("/")
            .fixture(),
        FixturePage::healthy("/missing-desc", "Hemp Seed Selection for First Seasons")
            .link("/")
            .without_description()
            .fixture(),
        ("/broken".to_string(), Fixture::Status(404)),
    ])
    .await
}
