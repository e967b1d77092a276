pub mod backend_errors;

use anyhow::Result;
use test_runner::TestRunner;

pub async fn run_tests(test_names: Option<Vec<String>>) -> Result<()> {
    let mut runner = TestRunner::new();

    let results = match test_names {
        Some(names) => runner.run_filtered_tests(&names).await?,
        None => runner.run_all_tests().await?,
    };

    let failed = results.iter().filter(|r| !r.passed && !r.skipped).count();
    if failed > 0 {
        return Err(anyhow::anyhow!("{} test(s) failed", failed));
    }

    Ok(())
}
