//! Aggregation of member alignments and construction of the run report.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{info, warn};
use uuid::Uuid;

use crate::config::defs::{
    ALIGNMENT_DESCRIPTION, ALIGNMENT_SET_DATA_DESCRIPTION, ALIGNMENT_SET_DESCRIPTION, PipelineError,
    REPORT_DIR_PREFIX, REPORT_HTML_WINDOW_HEIGHT, REPORT_OBJECT_PREFIX, RESULT_FILE_DESCRIPTION,
    RunConfig, SINGLE_RESULT_ZIP, SUMMARY_HTML,
};
use crate::pipelines::single::AlignmentResult;
use crate::services::{AlignmentSetSave, CreatedObject, FileLink, ReportInfo, ReportRequest, SetItem};
use crate::utils::file::{make_unique_dir, zip_directory};
use crate::utils::summary::AlignmentStats;

/// A stored alignment set and the member results it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentCollectionResult {
    pub set_ref: String,
    pub set_name: String,
    pub members: Vec<AlignmentResult>,
}

/// Saves the member alignments as one set, items in member order and
/// labelled by condition.
///
/// # Arguments
///
/// * `config` - run configuration and services
/// * `members` - successful member results in collection order
/// * `workspace_name` - destination workspace
/// * `set_name` - `<collection name><alignment_set_suffix>`
pub async fn save_alignment_collection(
    config: &RunConfig,
    members: Vec<AlignmentResult>,
    workspace_name: &str,
    set_name: &str,
) -> Result<AlignmentCollectionResult, PipelineError> {
    let save = AlignmentSetSave {
        workspace: workspace_name.to_string(),
        output_object_name: set_name.to_string(),
        description: ALIGNMENT_SET_DATA_DESCRIPTION.to_string(),
        items: members
            .iter()
            .map(|member| SetItem {
                reference: member.alignment_ref.clone(),
                label: Some(member.condition.clone()),
            })
            .collect(),
    };
    info!("Saving alignment set {} with {} item(s)", set_name, save.items.len());
    let set_ref = config.services.sets.save_alignment_set(&save).await?;

    Ok(AlignmentCollectionResult {
        set_ref,
        set_name: set_name.to_string(),
        members,
    })
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn format_rate(rate: Option<f64>) -> String {
    rate.map_or_else(|| "-".to_string(), |r| format!("{:.1}%", r))
}

fn stats_cells(stats: Option<&AlignmentStats>) -> String {
    match stats {
        Some(s) => format!(
            "<td>{}</td><td>{}</td><td>{}</td><td>{}</td>",
            s.input_reads,
            s.mapped_reads,
            format_rate(s.overall_rate),
            format_rate(s.concordant_rate)
        ),
        None => "<td>-</td><td>-</td><td>-</td><td>-</td>".to_string(),
    }
}

/// One table row per alignment.
pub fn render_summary_html(title: &str, results: &[AlignmentResult]) -> String {
    let mut html = String::new();
    html.push_str("<html>\n<head><meta charset=\"utf-8\"><title>");
    html.push_str(&escape_html(title));
    html.push_str("</title></head>\n<body>\n<h3>");
    html.push_str(&escape_html(title));
    html.push_str("</h3>\n<table border=\"1\" cellpadding=\"4\">\n");
    html.push_str("<tr><th>Reads</th><th>Condition</th><th>Alignment</th><th>Input reads</th><th>Mapped reads</th><th>Overall rate</th><th>Concordant rate</th></tr>\n");
    for result in results {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td>{}</tr>\n",
            escape_html(&result.library_name),
            escape_html(&result.condition),
            escape_html(&result.alignment_ref),
            stats_cells(result.stats.as_ref())
        ));
    }
    html.push_str("</table>\n</body>\n</html>\n");
    html
}

fn report_message(header: &str, results: &[AlignmentResult]) -> String {
    let mut message = format!("{}\n", header);
    for result in results {
        let rate = result
            .stats
            .as_ref()
            .and_then(|s| s.overall_rate)
            .map_or_else(String::new, |r| format!(", {:.1}% overall read mapping rate", r));
        message.push_str(&format!(
            "{} ({}): {}{}\n",
            result.library_name, result.condition, result.alignment_ref, rate
        ));
    }
    message
}

fn zip_link(path: PathBuf, label: &str) -> FileLink {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    FileLink {
        path: Some(path),
        shock_id: None,
        name,
        label: label.to_string(),
        description: Some(RESULT_FILE_DESCRIPTION.to_string()),
    }
}

async fn zip_in_background(dir: PathBuf, zip_path: PathBuf) -> Result<PathBuf, PipelineError> {
    tokio::task::spawn_blocking(move || zip_directory(&dir, &zip_path))
        .await
        .map_err(|e| PipelineError::WorkerAborted(e.to_string()))?
}

async fn write_summary_page(report_dir: &Path, title: &str, results: &[AlignmentResult]) -> Result<FileLink, PipelineError> {
    let page = report_dir.join(SUMMARY_HTML);
    tokio::fs::write(&page, render_summary_html(title, results)).await?;
    Ok(FileLink {
        path: Some(page),
        shock_id: None,
        name: SUMMARY_HTML.to_string(),
        label: SUMMARY_HTML.to_string(),
        description: Some("Summary of TopHat2 alignment".to_string()),
    })
}

/// Runs BAM QC on `alignment_ref` and returns its HTML report as a link.
async fn qc_link(config: &RunConfig, alignment_ref: &str) -> Result<FileLink, PipelineError> {
    info!("Running BAM QC on {}", alignment_ref);
    let qc = config.services.qc.run_bamqc(alignment_ref).await?;
    Ok(FileLink {
        path: None,
        shock_id: Some(qc.shock_id),
        name: qc.index_html_file_name,
        label: qc.name,
        description: Some("QualiMap report on the TopHat2 alignment".to_string()),
    })
}

async fn submit_report(
    config: &RunConfig,
    workspace_name: &str,
    message: String,
    file_links: Vec<FileLink>,
    html_links: Vec<FileLink>,
    objects_created: Vec<CreatedObject>,
) -> Result<ReportInfo, PipelineError> {
    let request = ReportRequest {
        message,
        workspace_name: workspace_name.to_string(),
        file_links,
        html_links,
        objects_created,
        direct_html_link_index: 0,
        html_window_height: REPORT_HTML_WINDOW_HEIGHT,
        report_object_name: format!("{}{}", REPORT_OBJECT_PREFIX, Uuid::new_v4()),
    };
    let report = config.services.report.create_extended_report(&request).await?;
    info!("Created report {} ({})", report.name, report.reference);
    Ok(report)
}

/// Report for a single-library run: zipped tophat output, QC page first,
/// summary page second.
pub async fn generate_single_report(
    config: &RunConfig,
    result: &AlignmentResult,
    result_dir: &Path,
    workspace_name: &str,
) -> Result<ReportInfo, PipelineError> {
    let zip_path = zip_in_background(result.result_dir.clone(), result_dir.join(SINGLE_RESULT_ZIP)).await?;
    let report_dir = make_unique_dir(result_dir, REPORT_DIR_PREFIX)?;
    let results = std::slice::from_ref(result);

    let html_links = vec![
        qc_link(config, &result.alignment_ref).await?,
        write_summary_page(&report_dir, "TopHat2 alignment", results).await?,
    ];

    submit_report(
        config,
        workspace_name,
        report_message("Created alignment:", results),
        vec![zip_link(zip_path, "TopHat2 result")],
        html_links,
        vec![CreatedObject {
            reference: result.alignment_ref.clone(),
            description: ALIGNMENT_DESCRIPTION.to_string(),
        }],
    )
    .await
}

/// Zip name for a member, unique within `taken`.
fn member_zip_name(result: &AlignmentResult, index: usize, taken: &mut HashSet<String>) -> String {
    let mut name = format!("{}.zip", result.library_name);
    let mut suffix = index + 1;
    while taken.contains(&name) {
        name = format!("{}_{}.zip", result.library_name, suffix);
        suffix += 1;
    }
    taken.insert(name.clone());
    name
}

/// Report for a collection run: the set and every member alignment as
/// created objects, one zip per member, a QC page over the set.
pub async fn generate_set_report(
    config: &RunConfig,
    collection: &AlignmentCollectionResult,
    result_dir: &Path,
    workspace_name: &str,
) -> Result<ReportInfo, PipelineError> {
    let report_dir = make_unique_dir(result_dir, REPORT_DIR_PREFIX)?;

    let mut file_links = Vec::with_capacity(collection.members.len());
    let mut taken = HashSet::new();
    for (index, member) in collection.members.iter().enumerate() {
        let zip_path = report_dir.join(member_zip_name(member, index, &mut taken));
        match zip_in_background(member.result_dir.clone(), zip_path).await {
            Ok(path) => file_links.push(zip_link(path, &member.library_name)),
            Err(e) => warn!("could not archive {}: {}", member.result_dir.display(), e),
        }
    }

    let mut objects_created = vec![CreatedObject {
        reference: collection.set_ref.clone(),
        description: ALIGNMENT_SET_DESCRIPTION.to_string(),
    }];
    objects_created.extend(collection.members.iter().map(|member| CreatedObject {
        reference: member.alignment_ref.clone(),
        description: ALIGNMENT_DESCRIPTION.to_string(),
    }));

    let html_links = vec![
        qc_link(config, &collection.set_ref).await?,
        write_summary_page(&report_dir, &collection.set_name, &collection.members).await?,
    ];

    submit_report(
        config,
        workspace_name,
        report_message(
            &format!("Created alignment set {} ({}):", collection.set_name, collection.set_ref),
            &collection.members,
        ),
        file_links,
        html_links,
        objects_created,
    )
    .await
}
