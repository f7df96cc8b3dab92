use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    for crd in [
        controller::Platform::crd(),
        controller::Template::crd(),
        controller::CentreonService::crd(),
        controller::CentreonServiceGroup::crd(),
    ] {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
