use kube::CustomResourceExt;

use netbench_operator::benchmark::NetBenchmark;

fn main() {
    print!("{}", serde_yaml::to_string(&NetBenchmark::crd()).unwrap());
}
