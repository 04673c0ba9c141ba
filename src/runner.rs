//! Sequential execution of the conformance cases.
//!
//! Cases run one at a time in a fixed order.  A failed case is reported
//! and the run moves on; only a failed setup phase stops it early.

use std::fmt;
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::cases;
use crate::config::Config;
use crate::errors::HarnessError;
use crate::fixtures::{FixtureSet, Fixtures, PrepareMode};
use crate::server::ServerConfig;

/// Everything a case needs.  Passed explicitly to every case.
#[derive(Debug)]
pub struct TestContext {
    pub server: ServerConfig,
    pub fixtures: Fixtures,
    pub mode: PrepareMode,
    /// Drives range selection and random bucket names.
    pub rng: StdRng,
}

impl TestContext {
    pub fn new(server: ServerConfig, fixtures: Fixtures, mode: PrepareMode, seed: u64) -> Self {
        Self {
            server,
            fixtures,
            mode,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Build the context for a run: generate the prepared set in prepare
    /// mode, otherwise load the unprepared set from the manifest.
    pub fn from_config(
        server: ServerConfig,
        config: &Config,
        seed: u64,
    ) -> Result<Self, HarnessError> {
        let mode = PrepareMode::from_flag(config.run.prepare);
        let mut ctx = Self::new(server, Fixtures::default(), mode, seed);
        match mode {
            PrepareMode::Prepared => {
                ctx.fixtures.prepared = FixtureSet::generate(
                    &mut ctx.rng,
                    config.run.bucket_count,
                    config.run.object_count,
                    config.run.object_size,
                );
            }
            PrepareMode::Unprepared => {
                ctx.fixtures.unprepared = FixtureSet::from_manifest(&config.fixtures.manifest)?;
            }
        }
        Ok(ctx)
    }
}

/// Seed from config, or from the wall clock when unset.
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
    })
}

/// The conformance cases, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestCase {
    ListBuckets,
    MakeBucket,
    GetObject,
    GetObjectRange,
    ListObjects,
    RemoveObject,
    RemoveBucketExists,
    RemoveBucketDne,
}

impl TestCase {
    pub const ALL: [TestCase; 8] = [
        TestCase::ListBuckets,
        TestCase::MakeBucket,
        TestCase::GetObject,
        TestCase::GetObjectRange,
        TestCase::ListObjects,
        TestCase::RemoveObject,
        TestCase::RemoveBucketExists,
        TestCase::RemoveBucketDne,
    ];

    /// Command names accepted on the command line.
    pub const COMMANDS: [&'static str; 6] = [
        "listbuckets",
        "makebucket",
        "getobject",
        "listobjects",
        "removeobject",
        "removebucket",
    ];

    /// Name shown in the status line.
    pub fn name(self) -> &'static str {
        match self {
            TestCase::ListBuckets => "ListBuckets",
            TestCase::MakeBucket => "MakeBucket",
            TestCase::GetObject => "GetObject",
            TestCase::GetObjectRange => "GetObject (Range)",
            TestCase::ListObjects => "ListObjects",
            TestCase::RemoveObject => "RemoveObject",
            TestCase::RemoveBucketExists => "RemoveBucket (Bucket Exists)",
            TestCase::RemoveBucketDne => "RemoveBucket (Bucket DNE)",
        }
    }

    /// The command that selects this case.
    pub fn command(self) -> &'static str {
        match self {
            TestCase::ListBuckets => "listbuckets",
            TestCase::MakeBucket => "makebucket",
            TestCase::GetObject | TestCase::GetObjectRange => "getobject",
            TestCase::ListObjects => "listobjects",
            TestCase::RemoveObject => "removeobject",
            TestCase::RemoveBucketExists | TestCase::RemoveBucketDne => "removebucket",
        }
    }

    pub async fn run(self, ctx: &mut TestContext) -> Result<(), HarnessError> {
        match self {
            TestCase::ListBuckets => cases::list_buckets(ctx).await,
            TestCase::MakeBucket => cases::make_bucket(ctx).await,
            TestCase::GetObject => cases::get_object(ctx).await,
            TestCase::GetObjectRange => cases::get_object_range(ctx).await,
            TestCase::ListObjects => cases::list_objects(ctx).await,
            TestCase::RemoveObject => cases::remove_object(ctx).await,
            TestCase::RemoveBucketExists => cases::remove_bucket_exists(ctx).await,
            TestCase::RemoveBucketDne => cases::remove_bucket_dne(ctx).await,
        }
    }

    /// Cases selected by `commands`, in run order.  No commands selects
    /// every case.
    pub fn select(commands: &[String]) -> Result<Vec<TestCase>, HarnessError> {
        if let Some(unknown) = commands
            .iter()
            .find(|c| !Self::COMMANDS.contains(&c.as_str()))
        {
            return Err(HarnessError::InvalidRequest(format!(
                "'{unknown}' is not a command; expected one of {}",
                Self::COMMANDS.join(", ")
            )));
        }
        Ok(Self::ALL
            .into_iter()
            .filter(|case| commands.is_empty() || commands.iter().any(|c| c == case.command()))
            .collect())
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one case.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    /// 1-based position in the run.
    pub index: usize,
    pub case: TestCase,
    /// The failure, rendered; `None` when the case passed.
    pub error: Option<String>,
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Set when the setup phase failed and no case ran.
    pub setup_error: Option<String>,
    pub outcomes: Vec<CaseOutcome>,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.setup_error.is_none() && self.failed() == 0
    }

    /// Process exit status: 0 iff setup and every case passed.
    pub fn exit_code(&self) -> u8 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }
}

/// Runs a fixed list of cases against one context.
#[derive(Debug, Clone)]
pub struct TestRunner {
    cases: Vec<TestCase>,
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new(TestCase::ALL.to_vec())
    }
}

impl TestRunner {
    pub fn new(cases: Vec<TestCase>) -> Self {
        Self { cases }
    }

    /// Run setup (in prepare mode), every case, then remove leftover
    /// prepared fixtures.  One status line per case goes to `out`.
    pub async fn run<W: Write>(
        &self,
        ctx: &mut TestContext,
        out: &mut W,
    ) -> io::Result<RunSummary> {
        let mut summary = RunSummary::default();

        if ctx.mode == PrepareMode::Prepared {
            if let Err(e) = cases::setup(ctx).await {
                warn!("setup failed: {e}");
                writeln!(out, "Setup: Failed: {e}")?;
                summary.setup_error = Some(e.to_string());
                cases::cleanup(ctx).await;
                return Ok(summary);
            }
        }

        let total = self.cases.len();
        for (i, case) in self.cases.iter().copied().enumerate() {
            let index = i + 1;
            let result = case.run(ctx).await;
            let error = match result {
                Ok(()) => {
                    writeln!(out, "[{index:02}/{total}] {case}: Passed")?;
                    None
                }
                Err(e) => {
                    warn!(case = case.name(), "case failed: {e}");
                    writeln!(out, "[{index:02}/{total}] {case}: Failed: {e}")?;
                    Some(e.to_string())
                }
            };
            summary.outcomes.push(CaseOutcome { index, case, error });
        }

        cases::cleanup(ctx).await;
        info!(
            "{} of {} cases passed",
            summary.passed(),
            summary.outcomes.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all_by_default() {
        assert_eq!(TestCase::select(&[]).unwrap(), TestCase::ALL.to_vec());
    }

    #[test]
    fn test_select_keeps_run_order() {
        let commands = vec!["removebucket".to_string(), "getobject".to_string()];
        assert_eq!(
            TestCase::select(&commands).unwrap(),
            vec![
                TestCase::GetObject,
                TestCase::GetObjectRange,
                TestCase::RemoveBucketExists,
                TestCase::RemoveBucketDne,
            ]
        );
    }

    #[test]
    fn test_select_unknown_command() {
        let err = TestCase::select(&["listbucket".to_string()]).unwrap_err();
        assert!(err.to_string().contains("listbuckets"));
    }

    #[test]
    fn test_exit_code() {
        let mut summary = RunSummary::default();
        assert_eq!(summary.exit_code(), 0);

        summary.outcomes.push(CaseOutcome {
            index: 1,
            case: TestCase::ListBuckets,
            error: None,
        });
        assert_eq!(summary.exit_code(), 0);

        summary.outcomes.push(CaseOutcome {
            index: 2,
            case: TestCase::MakeBucket,
            error: Some("Unexpected Status: wanted 200, got 403".to_string()),
        });
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.failed(), 1);

        let setup_failed = RunSummary {
            setup_error: Some("unreachable".to_string()),
            outcomes: vec![],
        };
        assert_eq!(setup_failed.exit_code(), 1);
    }

    #[test]
    fn test_resolve_seed() {
        assert_eq!(resolve_seed(Some(42)), 42);
    }

    #[tokio::test]
    async fn test_run_reports_transport_failures_and_continues() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let server = ServerConfig::new(&format!("http://{addr}"), "ak", "sk", "us-east-1").unwrap();
        let mut ctx = TestContext::new(server, Fixtures::default(), PrepareMode::Unprepared, 1);
        let runner = TestRunner::new(vec![TestCase::ListBuckets, TestCase::RemoveBucketDne]);

        let mut out = Vec::new();
        let summary = runner.run(&mut ctx, &mut out).await.unwrap();
        let out = String::from_utf8(out).unwrap();

        assert_eq!(summary.outcomes.len(), 2);
        assert_eq!(summary.failed(), 2);
        assert_eq!(summary.exit_code(), 1);
        assert!(out.starts_with("[01/2] ListBuckets: Failed: request failed"));
        assert!(out.contains("[02/2] RemoveBucket (Bucket DNE): Failed"));
    }
}
