//! Apply scenarios against the in-memory client

use gitlab_operator_kube::{Applier, ApplyOutcome, MockObjectClient, ObjectClient, Scheme};
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;

const DEPLOYMENT_1: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: test-deployment
  namespace: tests
  labels:
    app: test
spec:
  replicas: 1
  selector:
    matchLabels:
      app: test
  template:
    metadata:
      labels:
        app: test
    spec:
      containers:
        - name: nginx
          image: nginx:1.25
          ports:
            - containerPort: 80
          volumeMounts:
            - name: config
              mountPath: /etc/nginx/conf.d
            - name: data
              mountPath: /usr/share/nginx/html
      volumes:
        - name: config
          configMap:
            name: nginx-config
        - name: data
          emptyDir: {}
"#;

const DEPLOYMENT_2: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: test-deployment
  namespace: tests
  labels:
    app: test
spec:
  replicas: 1
  selector:
    matchLabels:
      app: test
  template:
    metadata:
      labels:
        app: test
    spec:
      containers:
        - name: nginx
          image: nginx:1.25
          ports:
            - containerPort: 80
          volumeMounts:
            - name: dummy
              mountPath: /dummy
            - name: config
              mountPath: /etc/nginx/conf.d
            - name: data
              mountPath: /usr/share/nginx/html
      volumes:
        - name: config
          configMap:
            name: nginx-config
        - name: data
          emptyDir: {}
        - name: dummy
          emptyDir: {}
"#;

const JOB: &str = r#"
apiVersion: batch/v1
kind: Job
metadata:
  name: test-job
  namespace: tests
spec:
  template:
    spec:
      restartPolicy: Never
      containers:
        - name: migrate
          image: busybox
          command: ["true"]
"#;

fn object(yaml: &str) -> DynamicObject {
    serde_yaml::from_str(yaml).unwrap()
}

async fn fetch_deployment(client: &MockObjectClient) -> Deployment {
    let gvk = GroupVersionKind::gvk("apps", "v1", "Deployment");
    let stored = client
        .get(&gvk, Some("tests"), "test-deployment")
        .await
        .unwrap()
        .unwrap();
    serde_json::from_value(serde_json::to_value(stored).unwrap()).unwrap()
}

#[tokio::test]
async fn test_strategic_merge_keeps_element_identity() {
    let client = MockObjectClient::new();
    let applier = Applier::builder().client(client.clone()).build().unwrap();

    assert_eq!(applier.apply(&object(DEPLOYMENT_1)).await.unwrap(), ApplyOutcome::Created);
    assert_eq!(applier.apply(&object(DEPLOYMENT_1)).await.unwrap(), ApplyOutcome::Unchanged);
    let generation = fetch_deployment(&client).await.metadata.generation.unwrap();

    assert_eq!(applier.apply(&object(DEPLOYMENT_2)).await.unwrap(), ApplyOutcome::Updated);

    let deployment = fetch_deployment(&client).await;
    assert!(deployment.metadata.generation.unwrap() > generation);

    let pod = deployment.spec.unwrap().template.spec.unwrap();
    let volumes = pod.volumes.unwrap();
    assert_eq!(volumes.len(), 3);
    assert_eq!(volumes[2].name, "dummy");

    let mounts = pod.containers[0].volume_mounts.clone().unwrap();
    assert_eq!(mounts.len(), 3);
    assert!(mounts.iter().any(|m| m.name == "dummy" && m.mount_path == "/dummy"));

    assert_eq!(applier.apply(&object(DEPLOYMENT_2)).await.unwrap(), ApplyOutcome::Unchanged);
}

#[tokio::test]
async fn test_removed_volume_is_deleted() {
    let client = MockObjectClient::new();
    let applier = Applier::builder().client(client.clone()).build().unwrap();

    applier.apply(&object(DEPLOYMENT_2)).await.unwrap();
    assert_eq!(applier.apply(&object(DEPLOYMENT_1)).await.unwrap(), ApplyOutcome::Updated);

    let pod = fetch_deployment(&client).await.spec.unwrap().template.spec.unwrap();
    let names: Vec<String> = pod.volumes.unwrap().into_iter().map(|v| v.name).collect();
    assert_eq!(names, vec!["config", "data"]);
}

#[tokio::test]
async fn test_unchanged_job_is_not_patched() {
    let client = MockObjectClient::new();
    let applier = Applier::builder().client(client.clone()).build().unwrap();

    assert_eq!(applier.apply(&object(JOB)).await.unwrap(), ApplyOutcome::Created);
    client.reset_counts();

    assert_eq!(applier.apply(&object(JOB)).await.unwrap(), ApplyOutcome::Unchanged);
    assert_eq!(client.operation_counts().patches, 0);
    assert_eq!(client.operation_counts().gets, 1);
}

#[tokio::test]
async fn test_merge_patch_without_scheme() {
    let client = MockObjectClient::new();
    let applier = Applier::builder()
        .client(client.clone())
        .scheme(Scheme::empty())
        .build()
        .unwrap();

    applier.apply(&object(DEPLOYMENT_1)).await.unwrap();
    assert_eq!(applier.apply(&object(DEPLOYMENT_2)).await.unwrap(), ApplyOutcome::Updated);

    // JSON merge replaces lists wholesale, so the order of the new list wins
    let pod = fetch_deployment(&client).await.spec.unwrap().template.spec.unwrap();
    assert_eq!(pod.volumes.unwrap().len(), 3);
}

fn with_tolerations(yaml: &str, second_value: &str) -> DynamicObject {
    let mut object = object(yaml);
    object.data["spec"]["template"]["spec"]["tolerations"] = serde_json::json!([
        {"key": "a", "operator": "Equal", "value": "1", "effect": "NoSchedule"},
        {"key": "b", "operator": "Equal", "value": second_value, "effect": "NoSchedule"},
    ]);
    object
}

#[tokio::test]
async fn test_changed_toleration_keeps_the_others() {
    let client = MockObjectClient::new();
    let applier = Applier::builder().client(client.clone()).build().unwrap();

    applier.apply(&with_tolerations(DEPLOYMENT_1, "1")).await.unwrap();
    assert_eq!(
        applier.apply(&with_tolerations(DEPLOYMENT_1, "2")).await.unwrap(),
        ApplyOutcome::Updated
    );

    let pod = fetch_deployment(&client).await.spec.unwrap().template.spec.unwrap();
    let tolerations: Vec<(String, String)> = pod
        .tolerations
        .unwrap()
        .into_iter()
        .map(|t| (t.key.unwrap_or_default(), t.value.unwrap_or_default()))
        .collect();
    assert_eq!(
        tolerations,
        vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
    );
}
