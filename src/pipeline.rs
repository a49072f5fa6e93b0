// 🚰 Pipeline - discover → read → normalize → build (parallel) → merge → reconcile → export
//
// Documents are independent until the merge. Each one runs on a worker
// thread and either yields a DocumentLedger or is skipped with a reason;
// nothing a single document does can stop the run. Only structural
// failures (input/output location, writing an artifact) are fatal.

use crate::account::AccountIdentifier;
use crate::config::PipelineConfig;
use crate::error::LedgerError;
use crate::export;
use crate::ledger::{DocumentLedger, LedgerBuilder};
use crate::normalizer::RecordNormalizer;
use crate::reader::{document_name, RawTableReader, TableExtractor};
use crate::reconciliation::BalanceReconciler;
use chrono::NaiveDate;
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// DISCOVERY
// ============================================================================

/// Files directly inside `dir` whose name matches `pattern`, sorted by name.
///
/// Matching is case-insensitive, so `*.pdf` also finds `STATEMENT.PDF`.
pub fn discover_documents(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, LedgerError> {
    let pattern = Pattern::new(pattern)
        .map_err(|e| LedgerError::Config(format!("document_pattern {:?}: {}", pattern, e)))?;
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let input_error = |source| LedgerError::InputLocation {
        path: dir.to_path_buf(),
        source,
    };

    let mut documents = Vec::new();
    for entry in fs::read_dir(dir).map_err(input_error)? {
        let path = entry.map_err(input_error)?.path();
        if !path.is_file() {
            continue;
        }
        let matched = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|name| pattern.matches_with(name, options))
            .unwrap_or(false);
        if matched {
            documents.push(path);
        }
    }

    documents.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(documents)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Progress notifications for front-ends
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Started {
        run_id: Uuid,
        documents: usize,
        workers: usize,
    },
    DocumentProcessed {
        index: usize,
        document: String,
        account_number: String,
        records: usize,
    },
    DocumentSkipped {
        index: usize,
        document: String,
        reason: String,
    },
    Merged {
        records: usize,
        duplicates: usize,
    },
    Reconciled {
        checked: usize,
        discrepancies: usize,
        unavailable: usize,
    },
    Finished {
        run_id: Uuid,
    },
}

// ============================================================================
// RUN SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedDocument {
    pub document: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub output_dir: PathBuf,

    // Documents
    pub documents_seen: usize,
    pub documents_processed: usize,
    pub skipped: Vec<SkippedDocument>,

    // Records
    pub records_extracted: usize,
    pub field_issues: usize,
    pub duplicates_removed: usize,
    pub ledger_records: usize,
    pub accounts: Vec<String>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,

    // Reconciliation
    pub transitions_checked: usize,
    pub discrepancies: usize,
    pub unavailable: usize,

    /// Every file written during the run
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    fn new(run_id: Uuid, output_dir: &Path, documents_seen: usize) -> Self {
        RunSummary {
            run_id,
            output_dir: output_dir.to_path_buf(),
            documents_seen,
            documents_processed: 0,
            skipped: Vec::new(),
            records_extracted: 0,
            field_issues: 0,
            duplicates_removed: 0,
            ledger_records: 0,
            accounts: Vec::new(),
            date_range: None,
            transitions_checked: 0,
            discrepancies: 0,
            unavailable: 0,
            outputs: Vec::new(),
        }
    }

    pub fn log(&self) {
        tracing::info!(run_id = %self.run_id, "Processing summary");
        tracing::info!(
            "Documents processed: {} of {} ({} skipped)",
            self.documents_processed,
            self.documents_seen,
            self.skipped.len()
        );
        tracing::info!(
            "Total transactions: {} ({} duplicates removed)",
            self.ledger_records,
            self.duplicates_removed
        );
        if let Some((first, last)) = self.date_range {
            tracing::info!("Date range: {} to {}", first, last);
        }
        tracing::info!(
            "Balance checks: {} checked, {} discrepancies, {} unavailable",
            self.transitions_checked,
            self.discrepancies,
            self.unavailable
        );
        tracing::info!("Files saved in: {}", self.output_dir.display());
    }
}

// ============================================================================
// DOCUMENT PROCESSOR
// ============================================================================

/// Everything one document needs, shareable with detached worker threads
struct DocumentProcessor {
    extractor: Arc<dyn TableExtractor>,
    header_label: String,
    normalizer: RecordNormalizer,
    builder: LedgerBuilder,
}

impl DocumentProcessor {
    fn process(&self, document: &Path) -> Result<DocumentLedger, LedgerError> {
        let reader = RawTableReader::new(self.extractor.as_ref(), &self.header_label);
        let raw = reader.read(document)?;
        let normalized = self.normalizer.normalize(&raw);

        tracing::debug!(
            document = %document_name(document),
            "{}",
            normalized.report.summary()
        );

        Ok(self.builder.build_document(document, normalized))
    }

    /// `process` with panics turned into a skipped document
    fn process_isolated(&self, document: &Path) -> Result<DocumentLedger, LedgerError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.process(document))).unwrap_or_else(|_| {
            Err(LedgerError::empty_because(
                document_name(document),
                "processing panicked",
            ))
        })
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    config: PipelineConfig,
    processor: Arc<DocumentProcessor>,
    events: Option<Sender<PipelineEvent>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, extractor: Arc<dyn TableExtractor>) -> Result<Self, LedgerError> {
        config.validate()?;
        let identifier = AccountIdentifier::new(&config.account_pattern)?;

        let processor = DocumentProcessor {
            extractor,
            header_label: config.header_label.clone(),
            normalizer: RecordNormalizer::new(&config),
            builder: LedgerBuilder::new(identifier),
        };

        Ok(Pipeline {
            config,
            processor: Arc::new(processor),
            events: None,
        })
    }

    /// Builder pattern: forward progress events to a front-end
    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            // a front-end that hung up does not stop the run
            let _ = events.send(event);
        }
    }

    /// Process `documents` in order and write every output into `output_dir`.
    pub fn run(&self, documents: &[PathBuf], output_dir: &Path) -> Result<RunSummary, LedgerError> {
        let run_id = Uuid::new_v4();
        export::ensure_output_dir(output_dir)?;

        let workers = self.config.workers.clamp(1, documents.len().max(1));
        let mut summary = RunSummary::new(run_id, output_dir, documents.len());

        tracing::info!(
            run_id = %run_id,
            documents = documents.len(),
            workers,
            "starting run"
        );
        self.emit(PipelineEvent::Started {
            run_id,
            documents: documents.len(),
            workers,
        });

        if documents.is_empty() {
            tracing::warn!("No documents found");
        }

        // Barrier: every outcome is in before anything is merged.
        let outcomes = self.process_all(documents, workers);

        let mut ledgers = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(ledger) => {
                    let path = export::write_document_csv(output_dir, &ledger)?;
                    summary.outputs.push(path);
                    summary.records_extracted += ledger.len();
                    summary.field_issues += ledger.report.field_issues.len();
                    ledgers.push(ledger);
                }
                Err(LedgerError::EmptyDocument { document, cause }) => {
                    summary.skipped.push(SkippedDocument {
                        document,
                        reason: cause.unwrap_or_else(|| "no extractable rows".to_string()),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        summary.documents_processed = ledgers.len();

        if ledgers.is_empty() {
            tracing::warn!("No document produced rows; combined outputs not written");
            self.finish(&summary);
            return Ok(summary);
        }

        let merged = self.processor.builder.merge(&ledgers);
        let ledger = merged.ledger;
        summary.duplicates_removed = merged.duplicates.len();
        summary.ledger_records = ledger.len();
        summary.accounts = ledger.accounts().into_iter().map(String::from).collect();
        summary.date_range = ledger.date_range();
        self.emit(PipelineEvent::Merged {
            records: ledger.len(),
            duplicates: summary.duplicates_removed,
        });

        let names = &self.config.output;

        let combined_csv = output_dir.join(&names.combined_csv);
        export::write_combined_csv(&combined_csv, &ledger)?;
        summary.outputs.push(combined_csv);

        #[cfg(feature = "xlsx")]
        {
            if names.write_xlsx {
                let combined_xlsx = output_dir.join(&names.combined_xlsx);
                export::write_combined_xlsx(&combined_xlsx, &ledger)?;
                summary.outputs.push(combined_xlsx);
            }
        }

        let reconciler = BalanceReconciler::with_tolerance(self.config.tolerance.clone());
        let report = reconciler.reconcile(&ledger);
        summary.transitions_checked = report.checked();
        summary.discrepancies = report.discrepancies();
        summary.unavailable = report.unavailable();
        self.emit(PipelineEvent::Reconciled {
            checked: summary.transitions_checked,
            discrepancies: summary.discrepancies,
            unavailable: summary.unavailable,
        });

        let validation_csv = output_dir.join(&names.validation_csv);
        export::write_validation_csv(&validation_csv, &report)?;
        summary.outputs.push(validation_csv);

        self.finish(&summary);
        Ok(summary)
    }

    fn finish(&self, summary: &RunSummary) {
        summary.log();
        self.emit(PipelineEvent::Finished {
            run_id: summary.run_id,
        });
    }

    /// Run every document on the worker pool; outcomes come back in input order.
    fn process_all(
        &self,
        documents: &[PathBuf],
        workers: usize,
    ) -> Vec<Result<DocumentLedger, LedgerError>> {
        let next = AtomicUsize::new(0);
        let (results_tx, results_rx) = mpsc::channel();
        let mut outcomes: Vec<Option<Result<DocumentLedger, LedgerError>>> =
            (0..documents.len()).map(|_| None).collect();

        thread::scope(|scope| {
            for _ in 0..workers {
                let results_tx = results_tx.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(document) = documents.get(index) else {
                        break;
                    };
                    let outcome = self.process_bounded(document);
                    if results_tx.send((index, outcome)).is_err() {
                        break;
                    }
                });
            }
            drop(results_tx);

            for (index, outcome) in results_rx.iter() {
                let document = document_name(&documents[index]);
                match &outcome {
                    Ok(ledger) => {
                        tracing::info!(
                            document = %document,
                            account = %ledger.account_number,
                            records = ledger.len(),
                            "processed document"
                        );
                        self.emit(PipelineEvent::DocumentProcessed {
                            index,
                            document,
                            account_number: ledger.account_number.clone(),
                            records: ledger.len(),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(document = %document, "skipping document: {}", e);
                        self.emit(PipelineEvent::DocumentSkipped {
                            index,
                            document,
                            reason: e.to_string(),
                        });
                    }
                }
                outcomes[index] = Some(outcome);
            }
        });

        outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| {
                outcome.unwrap_or_else(|| {
                    Err(LedgerError::empty_because(
                        document_name(&documents[index]),
                        "worker exited early",
                    ))
                })
            })
            .collect()
    }

    /// One document, bounded by the configured time limit.
    ///
    /// A document that runs over is reported as empty; its thread is left to
    /// finish on its own and the late result is discarded.
    fn process_bounded(&self, document: &Path) -> Result<DocumentLedger, LedgerError> {
        let Some(secs) = self.config.document_timeout_secs else {
            return self.processor.process_isolated(document);
        };

        let name = document_name(document);
        let (tx, rx) = mpsc::channel();
        let processor = Arc::clone(&self.processor);
        let owned = document.to_path_buf();

        thread::Builder::new()
            .name(format!("document-{}", name))
            .spawn(move || {
                let _ = tx.send(processor.process_isolated(&owned));
            })
            .map_err(|e| LedgerError::empty_because(name.clone(), format!("cannot spawn worker: {}", e)))?;

        match rx.recv_timeout(Duration::from_secs(secs)) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(LedgerError::empty_because(
                name,
                format!("timed out after {}s", secs),
            )),
            Err(RecvTimeoutError::Disconnected) => {
                Err(LedgerError::empty_because(name, "worker exited without a result"))
            }
        }
    }
}
