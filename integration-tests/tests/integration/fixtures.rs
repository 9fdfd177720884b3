// Copyright (c) The hostest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use integration_tests::{hostest_cli::HostestCli, suite::TempSuite};

pub(crate) static HOSTEST_BIN: &str = env!("CARGO_BIN_EXE_hostest-dup");
pub(crate) static FAKE_HOST_BIN: &str = env!("CARGO_BIN_EXE_fake-host");

pub(crate) static TEST_MATH: &str = "\
def test_add():
    assert 1 + 1 == 2

def test_sub():
    assert False

def test_skip():
    pytest.skip(\"not today\")
";

pub(crate) static TEST_CLS: &str = "\
class TestThing:
    def test_one(self):
        assert True

def helper():
    assert False
";

/// The summary line for a run of [`TEST_MATH`] and [`TEST_CLS`].
pub(crate) static FULL_SUMMARY: &str = "Summary 4 executed: 2 passed, 1 failed, 1 skipped";

/// A suite with one flat test file and one class-based test file in a package.
pub(crate) fn sample_suite() -> TempSuite {
    let suite = TempSuite::new(Utf8Path::new(FAKE_HOST_BIN)).expect("created temp suite");
    suite
        .write_file("test_math.py", TEST_MATH)
        .and_then(|suite| suite.write_file("pkg/test_cls.py", TEST_CLS))
        .expect("wrote test files");
    suite
}

pub(crate) fn empty_suite() -> TempSuite {
    TempSuite::new(Utf8Path::new(FAKE_HOST_BIN)).expect("created temp suite")
}

pub(crate) fn hostest(suite: &TempSuite) -> HostestCli {
    suite.cli(HOSTEST_BIN)
}
