//! Where build input comes from: an ordered list of titled documents.
//!
//! Two sources ship with the crate: Project Gutenberg ebooks fetched over HTTP (with
//! boilerplate stripping and optional splitting into works), and a local directory of
//! `.txt` / `.md` files.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use walkdir::WalkDir;

/// One logical document, in build order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    pub body: String,
}

/// Documents plus a note on where they came from (recorded in store metadata).
#[derive(Debug, Clone)]
pub struct Corpus {
    pub documents: Vec<Document>,
    pub provenance: String,
}

/// Supplies the documents for a build. Order must be stable across calls so
/// rebuilds assign the same rows.
#[allow(async_fn_in_trait)]
pub trait TextSource {
    async fn load(&self) -> Result<Corpus, AcquisitionError>;
}

/// How a fetched ebook becomes documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitMode {
    /// One document per play / poem, one per sonnet.
    Works,
    /// The whole cleaned text as a single document with this title.
    Whole(String),
}

/// Downloads a Project Gutenberg ebook, trying each mirror layout in turn.
#[derive(Debug, Clone)]
pub struct GutenbergSource {
    ebook_id: u32,
    split: SplitMode,
    client: reqwest::Client,
    base_url: String,
    max_retries: usize,
    backoff: Duration,
}

impl GutenbergSource {
    pub fn new(ebook_id: u32, split: SplitMode) -> Result<Self, AcquisitionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("folio/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AcquisitionError::Client(e.to_string()))?;
        Ok(Self {
            ebook_id,
            split,
            client,
            base_url: GUTENBERG_BASE_URL.to_string(),
            max_retries: 3,
            backoff: Duration::from_millis(250),
        })
    }

    /// Mirror root used to build the candidate URLs (no trailing slash).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the HTTP client (proxy, TLS or timeout settings).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Attempts per candidate URL, including the first.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Delay before the first retry; doubles on each further retry.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the raw text and the URL that served it.
    pub async fn fetch(&self) -> Result<(String, String), AcquisitionError> {
        let mut last_error = String::from("no candidate URLs");
        for url in candidate_urls(&self.base_url, self.ebook_id) {
            match self.fetch_with_retries(&url).await {
                Ok(text) => return Ok((text, url)),
                Err(e) => {
                    tracing::debug!("Gutenberg mirror {} failed: {}", url, e);
                    last_error = format!("{url}: {e}");
                }
            }
        }
        Err(AcquisitionError::Unreachable {
            ebook_id: self.ebook_id,
            last_error,
        })
    }

    async fn fetch_with_retries(&self, url: &str) -> Result<String, String> {
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let text = resp.text().await.map_err(|e| e.to_string())?;
                    if text.trim().is_empty() {
                        return Err("empty body".to_string());
                    }
                    return Ok(text);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error();
                    if !retryable || attempt + 1 >= self.max_retries {
                        return Err(format!("HTTP {status}"));
                    }
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect() || e.is_request();
                    if !retryable || attempt + 1 >= self.max_retries {
                        return Err(e.to_string());
                    }
                }
            }
            attempt += 1;
            tokio::time::sleep(retry_backoff(self.backoff, attempt)).await;
        }
    }
}

impl TextSource for GutenbergSource {
    async fn load(&self) -> Result<Corpus, AcquisitionError> {
        tracing::info!("Downloading Gutenberg ebook #{}", self.ebook_id);
        let (raw, url) = self.fetch().await?;
        let cleaned = strip_boilerplate(&raw);
        let documents = match &self.split {
            SplitMode::Works => split_works(&cleaned),
            SplitMode::Whole(title) => vec![Document {
                title: title.clone(),
                body: cleaned,
            }],
        };
        tracing::info!("Found {} documents in {}", documents.len(), url);
        Ok(Corpus {
            documents,
            provenance: url,
        })
    }
}

pub const GUTENBERG_BASE_URL: &str = "https://www.gutenberg.org";

/// Mirror layouts Project Gutenberg has used, most current first.
pub fn candidate_urls(base_url: &str, ebook_id: u32) -> Vec<String> {
    let id = ebook_id;
    vec![
        format!("{base_url}/ebooks/{id}.txt.utf-8"),
        format!("{base_url}/files/{id}/{id}-0.txt"),
        format!("{base_url}/files/{id}/{id}.txt"),
        format!("{base_url}/cache/epub/{id}/pg{id}.txt"),
        format!("{base_url}/cache/epub/{id}/pg{id}.txt.utf8"),
    ]
}

fn retry_backoff(base: Duration, attempt: usize) -> Duration {
    let capped = attempt.saturating_sub(1).min(5) as u32;
    base * (1 << capped)
}

static START_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\*\*\* *START OF (THIS|THE) PROJECT GUTENBERG EBOOK[^\n]*\n").expect("valid regex")
});
static END_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\*\*\* *END OF (THIS|THE) PROJECT GUTENBERG EBOOK[^\n]*(?:\n|$)").expect("valid regex")
});

/// Cuts the text between the Gutenberg START and END markers. Without both markers
/// (in order) the whole text is kept.
pub fn strip_boilerplate(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let start = START_MARKER.find(&text);
    let end = END_MARKER.find(&text);
    match (start, end) {
        (Some(s), Some(e)) if e.start() > s.end() => text[s.end()..e.start()].trim().to_string(),
        _ => {
            tracing::warn!("Gutenberg boilerplate markers not found; keeping the whole text");
            text.trim().to_string()
        }
    }
}

const WORK_TITLES: &[&str] = &[
    r"THE TRAGEDY OF [A-Z ,\-\.’'&]+",
    r"THE COMEDY OF [A-Z ,\-\.’'&]+",
    r"THE HISTOR(?:Y|IES) OF [A-Z ,\-\.’'&]+",
    r"THE LIFE (?:AND DEATH )?OF KING [A-Z IVX]+",
    r"THE LIFE OF TIMON OF ATHENS",
    r"PERICLES, PRINCE OF TYRE",
    r"THE TWO NOBLE KINSMEN",
    r"THE WINTER[’']S TALE",
    r"A MIDSUMMER(?:-NIGHT[’']S| NIGHT[’']S)? DREAM",
    r"LOVE[’']S LABOU?R[’']?S LOST",
    r"MUCH ADO ABOUT NOTHING",
    r"MEASURE FOR MEASURE",
    r"ALL[’']S WELL THAT ENDS WELL",
    r"AS YOU LIKE IT",
    r"TWELFTH NIGHT(?:; OR, WHAT YOU WILL)?",
    r"THE MERCHANT OF VENICE",
    r"THE MERRY WIVES OF WINDSOR",
    r"THE TAMING OF THE SHREW",
    r"THE TWO GENTLEMEN OF VERONA",
    r"THE TEMPEST",
    r"(?:THE TRAGEDY OF )?HAMLET, PRINCE OF DENMARK",
    r"(?:THE TRAGEDY OF )?OTHELLO, THE MOOR OF VENICE",
    r"(?:THE TRAGEDY OF )?MACBETH",
    r"(?:THE TRAGEDY OF )?KING LEAR",
    r"(?:THE TRAGEDY OF )?ROMEO AND JULIET",
    r"(?:THE TRAGEDY OF )?JULIUS CAESAR",
    r"(?:THE TRAGEDY OF )?ANTONY AND CLEOPATRA",
    r"(?:THE TRAGEDY OF )?CORIOLANUS",
    r"(?:THE TRAGEDY OF )?TITUS ANDRONICUS",
    r"CYMBELINE",
    r"TROILUS AND CRESSIDA",
    r"(?:THE LIFE AND DEATH OF )?KING JOHN",
    r"(?:THE TRAGEDY OF )?KING RICHARD II",
    r"(?:THE FIRST PART OF )?KING HENRY IV",
    r"(?:THE SECOND PART OF )?KING HENRY IV",
    r"(?:THE LIFE OF )?KING HENRY V",
    r"(?:THE TRAGEDY OF )?KING RICHARD III",
    r"(?:THE FIRST PART OF )?KING HENRY VI",
    r"(?:THE SECOND PART OF )?KING HENRY VI",
    r"(?:THE THIRD PART OF )?KING HENRY VI",
    r"(?:THE )?SONNETS",
    r"VENUS AND ADONIS",
    r"THE RAPE OF LUCRECE",
    r"THE PASSIONATE PILGRIM",
    r"A LOVER[’']S COMPLAINT",
];

static WORK_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?:{})\s*$", WORK_TITLES.join("|"))).expect("valid regex")
});
static ROMAN_NUMERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[IVXLCDM]+\s*$").expect("valid regex"));

/// Splits cleaned text into works at all-caps title lines. The sonnets section is
/// split further into one document per sonnet at Roman-numeral lines. Text before
/// the first title (the table of contents) is dropped.
pub fn split_works(text: &str) -> Vec<Document> {
    let lines: Vec<&str> = text.lines().collect();
    let headings: Vec<(usize, &str)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            let l = line.trim();
            let is_title = !l.is_empty() && l.to_uppercase() == l && WORK_TITLE.is_match(l);
            is_title.then_some((i, l))
        })
        .collect();

    let mut works = Vec::new();
    for (h, &(line_no, title)) in headings.iter().enumerate() {
        let end = headings.get(h + 1).map_or(lines.len(), |&(next, _)| next);
        let body = lines[line_no + 1..end].join("\n").trim().to_string();
        if title.contains("SONNETS") {
            works.extend(split_sonnets(&body));
        } else {
            works.push(Document {
                title: title_case(title),
                body,
            });
        }
    }
    works
}

fn split_sonnets(body: &str) -> Vec<Document> {
    let lines: Vec<&str> = body.lines().collect();
    let marks: Vec<(usize, &str)> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| ROMAN_NUMERAL.is_match(l))
        .map(|(i, l)| (i, l.trim()))
        .collect();
    let mut sonnets = Vec::new();
    for (j, &(pos, roman)) in marks.iter().enumerate() {
        let end = marks.get(j + 1).map_or(lines.len(), |&(next, _)| next);
        let text = lines[pos + 1..end].join("\n").trim().to_string();
        if !text.is_empty() {
            sonnets.push(Document {
                title: format!("Sonnet {roman}"),
                body: text,
            });
        }
    }
    sonnets
}

/// "THE TRAGEDY OF MACBETH" -> "The Tragedy Of Macbeth". Roman numerals stay upper.
fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            if word.chars().all(|c| matches!(c, 'I' | 'V' | 'X')) {
                return word.to_string();
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every `.txt` / `.md` file under a directory, one document per file, in path order.
/// Hidden files and directories are skipped; markdown frontmatter is stripped.
#[derive(Debug, Clone)]
pub struct LocalDirSource {
    root: PathBuf,
}

impl LocalDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn scan(&self) -> Result<Vec<Document>, AcquisitionError> {
        scan_dir(&self.root)
    }
}

impl TextSource for LocalDirSource {
    async fn load(&self) -> Result<Corpus, AcquisitionError> {
        let documents = self.scan()?;
        tracing::info!("Found {} documents under {}", documents.len(), self.root.display());
        Ok(Corpus {
            documents,
            provenance: self.root.display().to_string(),
        })
    }
}

fn scan_dir(root: &Path) -> Result<Vec<Document>, AcquisitionError> {
    if !root.is_dir() {
        return Err(AcquisitionError::NotADirectory(root.to_path_buf()));
    }
    let mut documents = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| AcquisitionError::Walk(e.to_string()))?;
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str());
        if !matches!(ext, Some("txt" | "md")) || !entry.file_type().is_file() {
            continue;
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AcquisitionError::Read(path.to_path_buf(), e))?;
        let body = if ext == Some("md") {
            strip_frontmatter(&raw)
        } else {
            raw
        };
        let title = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        documents.push(Document { title, body });
    }
    Ok(documents)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Removes optional YAML frontmatter (lines between first --- and second ---).
fn strip_frontmatter(content: &str) -> String {
    let s = content.trim_start();
    if !s.starts_with("---") {
        return content.to_string();
    }
    let after_first = s.strip_prefix("---").unwrap_or(s).trim_start();
    if let Some(rest) = after_first.find("\n---") {
        after_first[rest + 4..].trim_start().to_string()
    } else {
        content.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("could not download Gutenberg ebook {ebook_id}; last error: {last_error}")]
    Unreachable { ebook_id: u32, last_error: String },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("walk error: {0}")]
    Walk(String),
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
}
