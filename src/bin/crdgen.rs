use clique_operator::crd::{Clique, Group, ScalingGroup};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    for crd in [Group::crd(), ScalingGroup::crd(), Clique::crd()] {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
