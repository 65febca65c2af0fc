//! CLI command runner.
//!
//! Each command returns whether it succeeded; the binary maps that to the
//! process exit code.

use anyhow::Context;
use std::path::Path;
use tracing::warn;

use crate::cli::args::{
    error, listing_line, output, swagger_hint, Cli, Command, FileConfig, ImportScanArgs,
};
use crate::models::defectdojo::{NamedResource, ResourceKind};
use crate::services::defectdojo_client::{DefectDojoApi, DefectDojoClient, ImportOptions};
use crate::services::scan_import_service::{ScanImportRequest, ScanImporter};
use crate::services::threshold_service::ThresholdEvaluator;

/// Run a CLI command. Errors are reported on stderr and yield `false`.
pub async fn run(cli: Cli) -> bool {
    match execute(&cli).await {
        Ok(success) => success,
        Err(e) => {
            error(&cli.format, &format!("{:#}", e));
            false
        }
    }
}

async fn execute(cli: &Cli) -> anyhow::Result<bool> {
    // Load config file if provided
    let mut config = match cli.config {
        Some(ref path) => FileConfig::from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => FileConfig::default(),
    };

    // Merge CLI args with config
    config.merge_with_cli(cli);

    let format = cli.format.as_str();
    match &cli.command {
        Command::Test => run_test(format, &config).await,
        Command::ListEnvironments => {
            run_list_resources(format, &config, ResourceKind::Environment).await
        }
        Command::ListTestTypes => run_list_resources(format, &config, ResourceKind::TestType).await,
        Command::ListScanTypes => run_list_scan_types(format, &config).await,
        Command::Import {
            report_file,
            scan_type,
            engagement_id,
            test_type,
            environment,
            product_id,
            product_name,
            build_id,
            branch_name,
            close_old_findings,
            push_to_jira,
            skip_scan_type_check,
        } => {
            let request = ScanImportRequest {
                engagement_id: *engagement_id,
                test_type: test_type.clone(),
                environment: environment.clone(),
                report_file: report_file.clone(),
                scan_type: scan_type.clone(),
                build_id: build_id.clone(),
                branch_name: branch_name.clone(),
                product_id: *product_id,
                product_name: product_name.clone(),
                close_old_findings: *close_old_findings,
                push_to_jira: *push_to_jira,
            };
            run_import(format, &config, request, *skip_scan_type_check, cli.debug).await
        }
        Command::ImportScan(args) => run_import_scan(format, &config, args).await,
        Command::Check {
            product,
            high_max,
            medium_max,
        } => run_check(format, &config, *product, *high_max, *medium_max).await,
    }
}

/// Build a DefectDojo client from config and verify the connection
async fn build_client(config: &FileConfig) -> anyhow::Result<DefectDojoClient> {
    let client = DefectDojoClient::connect(config.connection()).await?;
    Ok(client)
}

fn ensure_report_file(path: &Path) -> anyhow::Result<()> {
    if !path.is_file() {
        anyhow::bail!("Report file not found: {}", path.display());
    }
    Ok(())
}

/// Test connection to DefectDojo
async fn run_test(format: &str, config: &FileConfig) -> anyhow::Result<bool> {
    let client = build_client(config).await?;
    output(
        format,
        &format!("Successfully connected to DefectDojo at {}", client.base_url()),
        Some(serde_json::json!({
            "status": "success",
            "url": client.base_url()
        })),
    );
    Ok(true)
}

/// Sort a listing the way it is printed
pub fn sort_for_listing(kind: ResourceKind, resources: &mut [NamedResource]) {
    match kind {
        ResourceKind::Environment => resources.sort_by_key(|r| r.id),
        ResourceKind::TestType => resources.sort_by(|a, b| a.name.cmp(&b.name)),
    }
}

async fn run_list_resources(
    format: &str,
    config: &FileConfig,
    kind: ResourceKind,
) -> anyhow::Result<bool> {
    let client = build_client(config).await?;
    let mut resources = client.list_resource(kind).await;
    sort_for_listing(kind, &mut resources);

    let plural = match kind {
        ResourceKind::Environment => "environments",
        ResourceKind::TestType => "test types",
    };

    if resources.is_empty() {
        output(
            format,
            &format!("No {} found. {}", plural, swagger_hint(client.base_url())),
            Some(serde_json::json!({
                "kind": kind.endpoint(),
                "items": [],
                "hint": swagger_hint(client.base_url())
            })),
        );
        return Ok(true);
    }

    let mut lines = vec![format!("Available {}:", plural)];
    lines.extend(resources.iter().map(|r| listing_line(&r.name, r.id)));
    output(
        format,
        &lines.join("\n"),
        Some(serde_json::json!({
            "kind": kind.endpoint(),
            "items": resources
        })),
    );
    Ok(true)
}

async fn run_list_scan_types(format: &str, config: &FileConfig) -> anyhow::Result<bool> {
    let client = build_client(config).await?;
    let mut scan_types = client.list_scan_types().await;
    scan_types.sort();

    if scan_types.is_empty() {
        output(
            format,
            &format!("No scan types found. {}", swagger_hint(client.base_url())),
            Some(serde_json::json!({
                "scan_types": [],
                "hint": swagger_hint(client.base_url())
            })),
        );
        return Ok(true);
    }

    let mut lines = vec!["Available scan types:".to_string()];
    lines.extend(scan_types.iter().map(|s| format!("  - {}", s)));
    output(
        format,
        &lines.join("\n"),
        Some(serde_json::json!({ "scan_types": scan_types })),
    );
    Ok(true)
}

/// Check a scan type against the server's list. An empty list means the
/// server could not tell us, so the import proceeds.
pub fn check_scan_type(scan_type: &str, available: &[String]) -> anyhow::Result<()> {
    if available.is_empty() {
        warn!("Could not retrieve scan types from API. Proceeding anyway.");
        return Ok(());
    }
    if !available.iter().any(|s| s == scan_type) {
        let mut sorted = available.to_vec();
        sorted.sort();
        anyhow::bail!(
            "Invalid scan type '{}'. Available scan types:\n{}",
            scan_type,
            sorted
                .iter()
                .map(|s| format!("  - {}", s))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }
    Ok(())
}

/// Print the product owning an engagement
async fn report_product(format: &str, client: &DefectDojoClient, engagement_id: i64) {
    let product_id = client
        .get_engagement(engagement_id)
        .await
        .and_then(|e| e.product_id);

    let Some(product_id) = product_id else {
        warn!(engagement_id, "Could not determine product from engagement");
        return;
    };

    match client.get_product(product_id).await {
        Some(product) => output(
            format,
            &format!("Found product: {} (ID: {})", product.name, product.id),
            Some(serde_json::json!({ "product": product })),
        ),
        None => warn!(product_id, "Found product ID but could not retrieve details"),
    }
}

/// Create a test and import a report into it
async fn run_import(
    format: &str,
    config: &FileConfig,
    request: ScanImportRequest,
    skip_scan_type_check: bool,
    debug: bool,
) -> anyhow::Result<bool> {
    ensure_report_file(&request.report_file)?;
    let client = build_client(config).await?;

    if debug {
        report_product(format, &client, request.engagement_id).await;
    }

    if !skip_scan_type_check {
        check_scan_type(&request.scan_type, &client.list_scan_types().await)?;
    }

    let outcome = ScanImporter::new(&client).import(&request).await;
    let value = serde_json::to_value(&outcome)?;

    if outcome.success {
        output(format, &serde_json::to_string_pretty(&value)?, Some(value));
        return Ok(true);
    }

    if let Some(e) = outcome.error() {
        error(format, &e.to_string());
    }
    eprintln!("{}", serde_json::to_string_pretty(&value)?);
    Ok(false)
}

/// Translate flags into import options
pub fn import_options(args: &ImportScanArgs) -> ImportOptions {
    ImportOptions {
        active: !args.inactive,
        verified: args.verified,
        close_old_findings: args.close_old_findings,
        push_to_jira: args.push_to_jira,
        engagement: args.engagement,
        product_name: args.product_name.clone(),
        engagement_name: args.engagement_name.clone(),
        product_type_name: args.product_type_name.clone(),
        auto_create_context: args.auto_create_context,
        deduplication_on_engagement: args.deduplication_on_engagement,
        scan_date: args.scan_date.clone(),
        minimum_severity: args.minimum_severity,
        endpoint_to_add: args.endpoint_to_add,
        test_title: args.test_title.clone(),
        build_id: args.build_id.clone(),
        branch_tag: args.branch_tag.clone(),
        commit_hash: args.commit_hash.clone(),
        tags: args.tags.clone(),
        environment: args.environment.clone(),
        version: args.version.clone(),
        service: args.service.clone(),
        source_code_management_uri: args.source_code_management_uri.clone(),
        engagement_end_date: args.engagement_end_date.clone(),
        lead: args.lead,
        ..Default::default()
    }
}

/// Upload a report without creating a test first
async fn run_import_scan(
    format: &str,
    config: &FileConfig,
    args: &ImportScanArgs,
) -> anyhow::Result<bool> {
    ensure_report_file(&args.file)?;
    let client = build_client(config).await?;

    let result = ScanImporter::new(&client)
        .import_direct(&args.file, &args.scan_type, import_options(args))
        .await?;

    let test_id = result
        .test_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let mut message = format!("Successfully imported the scan. Test ID: {}", test_id);
    if let Some(count) = result.finding_count {
        message.push_str(&format!("\nNumber of findings: {}", count));
    }

    output(format, &message, Some(serde_json::to_value(&result)?));
    Ok(true)
}

/// Evaluate the findings gate
async fn run_check(
    format: &str,
    config: &FileConfig,
    product: Option<i64>,
    high_max: Option<u32>,
    medium_max: Option<u32>,
) -> anyhow::Result<bool> {
    let client = build_client(config).await?;
    let policy = config.threshold_policy(high_max, medium_max);

    let verdict = ThresholdEvaluator::new(&client, policy)
        .evaluate(product)
        .await
        .context("Failed to retrieve findings")?;

    let mut lines = vec![
        format!("Critical: {}", verdict.counts.critical),
        format!("High: {}", verdict.counts.high),
        format!("Medium: {}", verdict.counts.medium),
    ];
    if verdict.passed {
        lines.push("Security check passed".to_string());
    } else {
        lines.push("Security check failed:".to_string());
        lines.extend(verdict.reasons.iter().map(|r| format!("  - {}", r)));
    }

    output(format, &lines.join("\n"), Some(serde_json::to_value(&verdict)?));
    Ok(verdict.passed)
}
