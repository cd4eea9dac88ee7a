//! Scenario runner: one line per scenario, with the hit spread it caused

use colored::Colorize;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use crate::types::Origins;

type ScenarioFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A named end-to-end scenario
pub struct Scenario {
    pub name: &'static str,
    run: Box<dyn Fn(TestContext) -> ScenarioFuture + Send + Sync>,
}

impl Scenario {
    pub fn new<F, Fut>(name: &'static str, run: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name,
            run: Box::new(move |ctx| Box::pin(run(ctx))),
        }
    }
}

/// What every scenario gets: where the balancer listens and the origins behind it
#[derive(Clone)]
pub struct TestContext {
    pub proxy_addr: String,
    pub origins: Origins,
    pub http_client: reqwest::Client,
}

/// Outcome of a run
#[derive(Default)]
pub struct Report {
    pub passed: usize,
    pub failures: Vec<(&'static str, String)>,
}

impl Report {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn print(&self) {
        println!();
        if self.succeeded() {
            println!("{}", format!("{} scenario(s) passed", self.passed).bright_green().bold());
            return;
        }
        println!(
            "{}",
            format!("{} passed, {} failed", self.passed, self.failures.len()).bright_red().bold()
        );
        for (name, error) in &self.failures {
            println!("  {} {}: {}", "✗".bright_red(), name, error);
        }
    }
}

/// Run the scenarios whose name contains `filter` (all when `None`), in order.
/// Origin hit counters are reset before each one.
pub async fn run_scenarios(scenarios: &[Scenario], ctx: &TestContext, filter: Option<&str>) -> Report {
    let mut report = Report::default();

    for scenario in scenarios
        .iter()
        .filter(|s| filter.map_or(true, |f| s.name.contains(f)))
    {
        ctx.origins.reset();
        let started = Instant::now();
        let outcome = (scenario.run)(ctx.clone()).await;
        let elapsed = started.elapsed().as_millis();

        let spread = ctx
            .origins
            .hits()
            .iter()
            .map(|(name, hits)| format!("{name}={hits}"))
            .collect::<Vec<_>>()
            .join(" ");

        match outcome {
            Ok(()) => {
                report.passed += 1;
                println!(
                    "{} {:<40} {:>5}ms  [{}]",
                    "ok  ".bright_green(),
                    scenario.name,
                    elapsed,
                    spread.dimmed()
                );
            }
            Err(e) => {
                println!(
                    "{} {:<40} {:>5}ms  [{}]",
                    "FAIL".bright_red().bold(),
                    scenario.name,
                    elapsed,
                    spread.dimmed()
                );
                report.failures.push((scenario.name, format!("{e:#}")));
            }
        }
    }

    report
}
