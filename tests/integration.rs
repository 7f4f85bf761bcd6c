use std::{
    fs,
    path::PathBuf,
    process::{Command, Output},
};

fn exec_bin(args: &[&str]) -> Output {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_polyres"));

    Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command")
}

fn run_bin(args: &[&str]) -> String {
    let output = exec_bin(args);

    let stdout_str =
        std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
    let stderr_str =
        std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );

    stdout_str.to_string()
}

fn write_sim_dir(name: &str, config_contents: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    fs::write(test_dir.join("config.toml"), config_contents).expect("failed to write config file");

    let fitted_contents = String::new()
        + "mutation_prop,mutation_scale_fung,mutation_scale_host,trait,mu,b\n"
        + "0.01,0.001,0.001,Fungicide,9.44,0.84\n"
        + "0.01,0.001,0.001,Mariboss,0.8,2.0\n"
        + "0.01,0.01,0.01,Fungicide,5.0,1.0\n";
    fs::write(test_dir.join("fitted.csv"), fitted_contents).expect("failed to write fitted file");

    test_dir
}

#[test]
fn basic_workflow() {
    let config_contents = String::new()
        + "[scenario]\n"
        + "n_years = 2\n"
        + "sprays = [ 0, 2,]\n"
        + "host_on = [ false, true,]\n"
        + "doses = [ 0.5, 1.0,]\n"
        + "\n"
        + "[pathogen]\n"
        + "n_k = 8\n"
        + "mutation_proportion = 0.01\n"
        + "mutation_scale_fung = 0.001\n"
        + "mutation_scale_host = 0.001\n"
        + "\n"
        + "[host]\n"
        + "n_l = 5\n";
    let test_dir = write_sim_dir("basic_workflow", &config_contents);

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin(&["--sim-dir", test_dir_str, "create"]);
    run_bin(&["--sim-dir", test_dir_str, "create"]);

    for run in ["run-0000", "run-0001"] {
        assert!(test_dir.join(run).join("yields.csv").is_file());
        assert!(test_dir.join(run).join("trajectory.msgpack").is_file());
    }

    let yields = fs::read_to_string(test_dir.join("run-0000").join("yields.csv"))
        .expect("failed to read yields");
    // 2 spray counts x 2 cultivar settings x 2 doses x 2 years, plus the header.
    assert_eq!(yields.lines().count(), 1 + 16);

    run_bin(&["--sim-dir", test_dir_str, "analyze"]);

    for file in ["combined.csv", "best_doses.csv", "best_doses_cumulative.csv"] {
        assert!(test_dir.join(file).is_file(), "missing {file}");
    }

    let beta: f64 = run_bin(&["--sim-dir", test_dir_str, "calibrate", "--severity", "0.3"])
        .trim()
        .parse()
        .expect("failed to parse calibrated beta");
    assert!(beta > 0.0 && beta < 5e-2);

    run_bin(&["--sim-dir", test_dir_str, "clean"]);

    assert!(!test_dir.join("run-0000").exists());
    assert!(!test_dir.join("combined.csv").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn multi_mode_without_host() {
    let config_contents = String::new()
        + "[scenario]\n"
        + "kind = \"multi\"\n"
        + "n_years = 3\n"
        + "sprays = [ 1,]\n"
        + "host_on = [ false,]\n"
        + "seed = 7\n"
        + "\n"
        + "[pathogen]\n"
        + "n_k = 6\n";
    let test_dir = write_sim_dir("multi_mode_without_host", &config_contents);

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    run_bin(&["--sim-dir", test_dir_str, "create"]);
    run_bin(&["--sim-dir", test_dir_str, "analyze"]);

    let best = fs::read_to_string(test_dir.join("best_doses.csv")).expect("failed to read");
    assert_eq!(best.lines().count(), 1 + 3);

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn failed_create_leaves_no_run_dir() {
    let valid_contents = String::new()
        + "[scenario]\n"
        + "n_years = 1\n"
        + "sprays = [ 1,]\n"
        + "host_on = [ false,]\n"
        + "\n"
        + "[pathogen]\n"
        + "n_k = 6\n";
    let invalid_contents = valid_contents.replace("n_years = 1\n", "n_years = 1\ni0 = 0.0\n");
    let test_dir = write_sim_dir("failed_create_leaves_no_run_dir", &invalid_contents);

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    let output = exec_bin(&["--sim-dir", test_dir_str, "create"]);
    assert!(!output.status.success());
    assert!(!test_dir.join("run-0000").exists());

    fs::write(test_dir.join("config.toml"), &valid_contents).expect("failed to write config file");

    run_bin(&["--sim-dir", test_dir_str, "create"]);
    assert!(test_dir.join("run-0000").join("yields.csv").is_file());
    assert!(!test_dir.join("run-0001").exists());

    run_bin(&["--sim-dir", test_dir_str, "analyze"]);

    fs::remove_dir_all(&test_dir).ok();
}
