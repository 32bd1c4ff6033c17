//! The disk-paged streaming term store.
//!
//! Lifecycle: construct over a rule set, [`ground`] exactly once to
//! generate and page out every objective term, then run any number
//! of [`pass`]es.  Grounding streams ground rules straight into page
//! files, so at no point does the full term set live in memory; a
//! pass rehydrates one page at a time into a reusable arena of
//! terms, optionally shuffling both the page visit order and the
//! in-page term order.
//!
//! The shuffle never leaks to disk: a per-page map records where
//! each arena slot came from, and the volatile write-back routes
//! every multiplier to its fixed-file position.  Fixed pages are
//! written once and only read afterwards.
//!
//! [`ground`]: StreamingTermStore::ground
//! [`pass`]: StreamingTermStore::pass

mod page;

use crate::generator::TermGenerator;
use crate::term::ObjectiveTerm;
use crate::variables::VariableIndex;
use clause_grounder::{
    ground_all, lookup_rule, Database, GroundAtom, GroundingError, GroundingStats, Rule,
    ViolationPolicy,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no weighted rule with a positive weight to optimize")]
    NoUsableRules,
    #[error("term store is already grounded")]
    AlreadyGrounded,
    #[error("term store has not finished grounding")]
    StillGrowing,
    #[error("page directory {dir}: {source}")]
    Directory { dir: PathBuf, source: io::Error },
    #[error("i/o failure on page {page}: {source}")]
    PageIo { page: usize, source: io::Error },
    #[error("short read on page {page}")]
    ShortRead { page: usize },
    #[error("corrupt page {page}: {detail}")]
    Corrupt { page: usize, detail: String },
    #[error("term references unregistered rule hash {hash}")]
    UnknownRule { hash: i32 },
    #[error("page files yielded {visited} terms, expected {expected}")]
    TermCountMismatch { visited: usize, expected: usize },
    #[error(transparent)]
    Grounding(#[from] GroundingError),
}

impl StoreError {
    fn from_page_io(page: usize, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::UnexpectedEof => StoreError::ShortRead { page },
            io::ErrorKind::InvalidData => StoreError::Corrupt {
                page,
                detail: source.to_string(),
            },
            _ => StoreError::PageIo { page, source },
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Terms per page.
    pub page_size: usize,
    /// Where page files live; `None` picks a fresh directory under
    /// the system temp dir, removed when the store drops.
    pub page_dir: Option<PathBuf>,
    /// Visit pages in a fresh random order each pass.
    pub shuffle_pages: bool,
    /// Shuffle term order within each rehydrated page.
    pub shuffle_terms: bool,
    /// Dual box-constraint scale stamped into every term.
    pub c: f32,
    /// Query rows grounded per parallel batch.
    pub batch_size: usize,
    pub violation_policy: ViolationPolicy,
    /// Shuffle seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            page_size: 10_000,
            page_dir: None,
            shuffle_pages: true,
            shuffle_terms: true,
            c: 10.0,
            batch_size: clause_grounder::grounding::DEFAULT_BATCH_SIZE,
            violation_policy: ViolationPolicy::Error,
            seed: None,
        }
    }
}

#[derive(Debug)]
pub struct StreamingTermStore {
    rules: Vec<Arc<Rule>>,
    options: StoreOptions,
    dir: PathBuf,
    owns_dir: bool,
    variables: VariableIndex,
    /// Term count per page, in page-index order.
    page_counts: Vec<usize>,
    total_terms: usize,
    grounded: bool,
    pool: Vec<ObjectiveTerm>,
    write_buffer: Vec<ObjectiveTerm>,
    byte_scratch: Vec<u8>,
    shuffle_map: Vec<usize>,
    rng: StdRng,
}

impl StreamingTermStore {
    /// Builds a store over the usable subset of `rules`.
    /// Constraint rules and rules with non-positive weights cannot
    /// drive this solver; they are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `Err` when no usable rule remains, or when the page
    /// directory cannot be created.
    pub fn new(rules: &[Arc<Rule>], options: StoreOptions) -> Result<Self, StoreError> {
        assert!(options.page_size > 0);
        assert!(options.c > 0.0);

        let mut usable = Vec::new();
        for rule in rules {
            match rule.weight() {
                None => warn!(rule = %rule, "skipping unweighted rule"),
                Some(w) if w <= 0.0 => {
                    warn!(rule = %rule, weight = w, "skipping rule with non-positive weight");
                }
                Some(_) => usable.push(rule.clone()),
            }
        }
        if usable.is_empty() {
            return Err(StoreError::NoUsableRules);
        }

        let (dir, owns_dir) = match &options.page_dir {
            Some(dir) => (dir.clone(), false),
            None => (scratch_directory(), true),
        };
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Directory {
            dir: dir.clone(),
            source,
        })?;

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(StreamingTermStore {
            rules: usable,
            options,
            dir,
            owns_dir,
            variables: VariableIndex::new(),
            page_counts: Vec::new(),
            total_terms: 0,
            grounded: false,
            pool: Vec::new(),
            write_buffer: Vec::new(),
            byte_scratch: Vec::new(),
            shuffle_map: Vec::new(),
            rng,
        })
    }

    /// Grounds every rule against `db`, generating terms and paging
    /// them out as pages fill.  Must complete before the first pass
    /// and cannot run twice.
    ///
    /// # Errors
    ///
    /// Returns `Err` on grounding failures, on page I/O failures,
    /// and on a second invocation.
    pub fn ground(&mut self, db: &(impl Database + ?Sized)) -> Result<GroundingStats, StoreError> {
        if self.grounded {
            return Err(StoreError::AlreadyGrounded);
        }

        let generator = TermGenerator::new(self.options.c);
        let mut flush_error: Option<StoreError> = None;
        let stats = {
            let StreamingTermStore {
                rules,
                options,
                dir,
                variables,
                page_counts,
                total_terms,
                write_buffer,
                byte_scratch,
                ..
            } = self;

            ground_all(
                rules,
                db,
                options.violation_policy,
                options.batch_size,
                |ground| {
                    if flush_error.is_some() {
                        return;
                    }
                    if let Some(term) = generator.generate(&ground, variables) {
                        write_buffer.push(term);
                        *total_terms += 1;
                        if write_buffer.len() >= options.page_size {
                            if let Err(e) = flush_page(dir, page_counts, write_buffer, byte_scratch)
                            {
                                flush_error = Some(e);
                            }
                        }
                    }
                },
            )?
        };
        if let Some(e) = flush_error {
            return Err(e);
        }
        if !self.write_buffer.is_empty() {
            flush_page(
                &self.dir,
                &mut self.page_counts,
                &mut self.write_buffer,
                &mut self.byte_scratch,
            )?;
        }

        self.grounded = true;
        info!(
            terms = self.total_terms,
            pages = self.page_counts.len(),
            variables = self.variables.len(),
            "term store grounded"
        );
        Ok(stats)
    }

    #[must_use]
    pub fn term_count(&self) -> usize {
        self.total_terms
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_counts.len()
    }

    #[must_use]
    pub fn variables(&self) -> &VariableIndex {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableIndex {
        &mut self.variables
    }

    /// Streams every term through `visit` with write access, page by
    /// page, honoring the configured shuffles, and persists the
    /// updated multipliers.  `visit` gets the term, its rule's
    /// current weight, and the variable values.
    ///
    /// # Errors
    ///
    /// Returns `Err` before grounding completes, on page I/O
    /// failures, when a term's rule hash is not registered, and when
    /// the pages disagree with the grounded term count.
    pub fn pass(
        &mut self,
        mut visit: impl FnMut(&mut ObjectiveTerm, f32, &mut [f32]),
    ) -> Result<(), StoreError> {
        self.pass_inner(true, |term, weight, values| visit(term, weight, values))
    }

    /// Like [`pass`](StreamingTermStore::pass), but without
    /// shuffling and without writing multipliers back; used for
    /// objective evaluation.
    ///
    /// # Errors
    ///
    /// Same conditions as [`pass`](StreamingTermStore::pass).
    pub fn read_only_pass(
        &mut self,
        mut visit: impl FnMut(&ObjectiveTerm, f32, &[f32]),
    ) -> Result<(), StoreError> {
        self.pass_inner(false, |term, weight, values| visit(term, weight, values))
    }

    fn pass_inner(
        &mut self,
        mutating: bool,
        mut visit: impl FnMut(&mut ObjectiveTerm, f32, &mut [f32]),
    ) -> Result<(), StoreError> {
        if !self.grounded {
            return Err(StoreError::StillGrowing);
        }

        // Weights are sampled once per pass, so mid-pass reweighting
        // cannot tear a page.
        let mut weights: HashMap<i32, f32> = HashMap::with_capacity(self.rules.len());
        for rule in &self.rules {
            if let Some(weight) = rule.weight() {
                weights.insert(rule.hash(), weight);
            }
        }

        let mut order: Vec<usize> = (0..self.page_counts.len()).collect();
        if mutating && self.options.shuffle_pages {
            order.shuffle(&mut self.rng);
        }

        let mut visited = 0;
        for page in order {
            let count = self.load_page(page)?;

            self.shuffle_map.clear();
            self.shuffle_map.extend(0..count);
            if mutating && self.options.shuffle_terms {
                // Paired Fisher-Yates: the map tracks each term's
                // fixed-file slot through the shuffle.
                for i in (1..count).rev() {
                    let j = self.rng.gen_range(0..=i);
                    self.pool.swap(i, j);
                    self.shuffle_map.swap(i, j);
                }
            }

            for k in 0..count {
                let term = &mut self.pool[k];
                let weight = match weights.get(&term.rule_hash()) {
                    Some(weight) => *weight,
                    None => match lookup_rule(term.rule_hash()).and_then(|r| r.weight()) {
                        Some(weight) => weight,
                        None => {
                            return Err(StoreError::UnknownRule {
                                hash: term.rule_hash(),
                            })
                        }
                    },
                };
                visit(term, weight, self.variables.values_mut());
            }
            visited += count;

            if mutating {
                page::write_volatile_page(
                    &page::volatile_page_path(&self.dir, page),
                    &self.pool,
                    count,
                    Some(&self.shuffle_map),
                    &mut self.byte_scratch,
                )
                .map_err(|e| StoreError::from_page_io(page, e))?;
            }
        }

        if visited != self.total_terms {
            return Err(StoreError::TermCountMismatch {
                visited,
                expected: self.total_terms,
            });
        }

        Ok(())
    }

    fn load_page(&mut self, page: usize) -> Result<usize, StoreError> {
        let count = page::read_fixed_page(
            &page::fixed_page_path(&self.dir, page),
            &mut self.pool,
            &mut self.byte_scratch,
        )
        .map_err(|e| StoreError::from_page_io(page, e))?;
        if count != self.page_counts[page] {
            return Err(StoreError::Corrupt {
                page,
                detail: format!(
                    "page holds {} terms, store recorded {}",
                    count, self.page_counts[page]
                ),
            });
        }

        page::read_volatile_page(
            &page::volatile_page_path(&self.dir, page),
            &mut self.pool,
            count,
            &mut self.byte_scratch,
        )
        .map_err(|e| StoreError::from_page_io(page, e))?;

        Ok(count)
    }

    /// Clamps every variable to the unit interval.
    pub fn clamp_values(&mut self) {
        self.variables.clamp_values();
    }

    /// Writes the current variable values back into their atoms and
    /// returns them.
    pub fn sync_atoms(&mut self) -> &[GroundAtom] {
        self.variables.sync_atoms()
    }

    /// Deletes all page files and resets the store to its
    /// pre-grounding state; the same store can then ground again.
    pub fn clear(&mut self) {
        for page in 0..self.page_counts.len() {
            let _ = std::fs::remove_file(page::fixed_page_path(&self.dir, page));
            let _ = std::fs::remove_file(page::volatile_page_path(&self.dir, page));
        }
        self.page_counts.clear();
        self.total_terms = 0;
        self.grounded = false;
        self.variables.clear();
        self.pool.clear();
        self.write_buffer.clear();
    }
}

impl Drop for StreamingTermStore {
    fn drop(&mut self) {
        self.clear();
        if self.owns_dir {
            let _ = std::fs::remove_dir(&self.dir);
        }
    }
}

fn flush_page(
    dir: &Path,
    page_counts: &mut Vec<usize>,
    write_buffer: &mut Vec<ObjectiveTerm>,
    byte_scratch: &mut Vec<u8>,
) -> Result<(), StoreError> {
    let page = page_counts.len();
    page::write_fixed_page(&page::fixed_page_path(dir, page), write_buffer, byte_scratch)
        .map_err(|e| StoreError::from_page_io(page, e))?;
    // Multipliers start at zero; the volatile file exists from the
    // start so every pass reads the same pair of files.
    page::write_volatile_page(
        &page::volatile_page_path(dir, page),
        write_buffer,
        write_buffer.len(),
        None,
        byte_scratch,
    )
    .map_err(|e| StoreError::from_page_io(page, e))?;

    page_counts.push(write_buffer.len());
    write_buffer.clear();
    Ok(())
}

fn scratch_directory() -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "streaming-dcd-{}-{}",
        std::process::id(),
        unique
    ))
}
