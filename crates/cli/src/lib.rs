use annotator_core::{
    forced_visible, visible_on, AnnotationId, DocBox, LabelId, PageTokens, PdfAnnotations,
    RelationGroup, RelationId, ScreenBox, TokenId, TokenIndex, VisibilitySettings,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use viewer_core::{CanvasOffset, PageCoordinateMapper, ZoomBounds, ZoomLevel};

#[derive(Debug, Parser)]
#[command(name = "annotator")]
#[command(about = "Token-layer and annotation tooling")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve a screen-space drag rectangle into covered tokens.
    Resolve {
        /// Token-loader payload: `[{page, tokens}]`
        #[arg(long, value_name = "FILE")]
        tokens: PathBuf,
        #[arg(long)]
        page: u32,
        #[arg(long, allow_hyphen_values = true)]
        left: f64,
        #[arg(long, allow_hyphen_values = true)]
        top: f64,
        #[arg(long, allow_hyphen_values = true)]
        right: f64,
        #[arg(long, allow_hyphen_values = true)]
        bottom: f64,
        #[arg(long, default_value_t = 1.0)]
        zoom: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        offset_left: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        offset_top: f64,
    },
    /// List the annotation ids that render on a page.
    Visible {
        /// Serialized annotation aggregate
        #[arg(long, value_name = "FILE")]
        document: PathBuf,
        #[arg(long)]
        page: u32,
        #[arg(long)]
        show_structural: bool,
        #[arg(long)]
        selected_only: bool,
        #[arg(long = "label", value_name = "ID")]
        labels: Vec<String>,
        #[arg(long = "selected", value_name = "ID")]
        selected: Vec<String>,
        #[arg(long = "forced-relation", value_name = "ID")]
        forced_relations: Vec<String>,
    },
    /// Show the relation cleanup that deleting an annotation triggers.
    Cascade {
        #[arg(long, value_name = "FILE")]
        document: PathBuf,
        #[arg(long)]
        annotation: String,
    },
    /// Phrase search over one page's token layer.
    Search {
        #[arg(long, value_name = "FILE")]
        tokens: PathBuf,
        #[arg(long)]
        page: u32,
        #[arg(long)]
        query: String,
        #[arg(long)]
        case_sensitive: bool,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveOutput {
    page: u32,
    token_layer_available: bool,
    token_ids: Vec<TokenId>,
    doc_space_box: DocBox,
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CascadeOutput {
    to_delete: Vec<RelationId>,
    to_update: Vec<RelationGroup>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchOutput {
    page: u32,
    token_ids: Vec<TokenId>,
    bounds: DocBox,
    text: String,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Resolve { tokens, page, left, top, right, bottom, zoom, offset_left, offset_top } => {
            let screen = ScreenBox::new(left, top, right, bottom);
            run_resolve(&tokens, page, screen, zoom, CanvasOffset::new(offset_left, offset_top))
        }
        Commands::Visible { document, page, show_structural, selected_only, labels, selected, forced_relations } => {
            let settings = VisibilitySettings {
                show_structural_only: show_structural,
                show_selected_only: selected_only,
                label_filter: (!labels.is_empty()).then(|| labels.into_iter().map(LabelId::from).collect()),
            };
            let selected = selected.into_iter().map(AnnotationId::from).collect();
            let forced = forced_relations.into_iter().map(RelationId::from).collect();
            run_visible(&document, page, &settings, &selected, &forced)
        }
        Commands::Cascade { document, annotation } => run_cascade(&document, &AnnotationId::from(annotation)),
        Commands::Search { tokens, page, query, case_sensitive } => {
            run_search(&tokens, page, &query, case_sensitive)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_resolve(tokens: &Path, page: u32, screen: ScreenBox, zoom: f64, offset: CanvasOffset) -> Result<()> {
    let bounds = ZoomBounds::default();
    if bounds.clamp(zoom) != zoom {
        anyhow::bail!("--zoom must be between {} and {}, got {zoom}", bounds.min, bounds.max);
    }

    let index = Arc::new(load_page(tokens, page)?);
    let zoom = ZoomLevel::new(zoom, bounds).context("invalid zoom")?;
    let mapper = PageCoordinateMapper::new(Arc::clone(&index), &zoom, offset);

    let selection = mapper.resolve_selection(&screen).context("failed to resolve selection")?;
    tracing::debug!(page, tokens = selection.token_ids.len(), "selection resolved");

    print_json(&ResolveOutput {
        page,
        token_layer_available: index.is_available(),
        text: index.text_of(&selection.token_ids),
        token_ids: selection.token_ids,
        doc_space_box: selection.doc_box,
    })
}

fn run_visible(
    document: &Path,
    page: u32,
    settings: &VisibilitySettings,
    selected: &BTreeSet<AnnotationId>,
    forced_relations: &BTreeSet<RelationId>,
) -> Result<()> {
    let doc: PdfAnnotations = read_json(document)?;
    let forced = forced_visible(&doc.relations, forced_relations);

    let ids: Vec<&AnnotationId> =
        visible_on(page, &doc.annotations, settings, selected, &forced).into_iter().map(|a| &a.id).collect();
    print_json(&ids)
}

fn run_cascade(document: &Path, annotation: &AnnotationId) -> Result<()> {
    let doc: PdfAnnotations = read_json(document)?;
    let (_, plan) = doc.without_annotation(annotation).context("cannot delete annotation")?;

    print_json(&CascadeOutput { to_delete: plan.delete_ids(), to_update: plan.to_update })
}

fn run_search(tokens: &Path, page: u32, query: &str, case_sensitive: bool) -> Result<()> {
    let index = load_page(tokens, page)?;
    let matches: Vec<MatchOutput> = index
        .search(query, case_sensitive)
        .into_iter()
        .map(|m| MatchOutput { text: index.text_of(&m.token_ids), page: m.page, token_ids: m.token_ids, bounds: m.bounds })
        .collect();

    print_json(&matches)
}

/// Token layer for `page`; a page missing from the payload has none
fn load_page(path: &Path, page: u32) -> Result<TokenIndex> {
    let pages: Vec<PageTokens> = read_json(path)?;
    let index = match pages.into_iter().find(|p| p.page == page) {
        Some(payload) => TokenIndex::from_page_tokens(payload),
        None => TokenIndex::unavailable(page),
    };
    Ok(index)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    ensure_file_exists(path)?;
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}
