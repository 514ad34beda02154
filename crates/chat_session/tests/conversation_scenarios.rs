//! End-to-end behaviour of the conversation controller

mod support;

use std::collections::HashMap;
use std::sync::Arc;

use chat_session::{
    ConversationConfig, ConversationController, ConversationError, GeneratedResponse,
    GenerationError, NodeId, Role, TreeError, Turn,
};
use support::ScriptedGenerator;

fn controller_with(generator: Arc<ScriptedGenerator>) -> ConversationController {
    ConversationController::new(generator, ConversationConfig::default())
}

async fn assert_children_consistent(controller: &ConversationController) {
    let snapshot = controller.snapshot().await;
    let mut expected: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for node in &snapshot.nodes {
        if let Some(parent) = node.parent_id() {
            expected.entry(parent).or_default().push(node.id());
        }
    }
    for node in &snapshot.nodes {
        let wanted = expected.remove(&node.id()).unwrap_or_default();
        assert_eq!(node.children_ids(), wanted.as_slice());
    }
}

#[tokio::test]
async fn first_message_creates_root_and_answer() {
    let generator = ScriptedGenerator::new();
    let controller = controller_with(generator.clone());

    let outcome = controller.add_message("Hi").await.unwrap();
    let (n1, n2) = (outcome.prompt_node_id, outcome.response_node_id);

    let user = controller.node(n1).await.unwrap();
    assert!(user.is_root());
    assert_eq!(user.turn(), &Turn::user("Hi"));

    let answer = controller.node(n2).await.unwrap();
    assert_eq!(answer.parent_id(), Some(n1));
    assert_eq!(answer.role(), Role::Assistant);
    assert_eq!(answer.turn().model(), Some("scripted-model"));

    assert!(outcome.selected);
    assert_eq!(controller.active_thread().await, vec![n1, n2]);

    let calls = generator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1);
    assert_eq!(calls[0][0].text, "Hi");
}

#[tokio::test]
async fn regenerate_adds_sibling_and_selects_it() {
    let controller = controller_with(ScriptedGenerator::new());
    let first = controller.add_message("Hi").await.unwrap();
    let (n1, n2) = (first.prompt_node_id, first.response_node_id);

    let again = controller.regenerate_response(n1).await.unwrap();
    let n3 = again.response_node_id;

    assert_eq!(again.prompt_node_id, n1);
    assert_eq!(controller.node(n3).await.unwrap().parent_id(), Some(n1));

    let info2 = controller.branch_info(n2).await.unwrap();
    let info3 = controller.branch_info(n3).await.unwrap();
    assert_eq!(info2.sibling_count, 2);
    assert_eq!(info3.sibling_count, 2);
    assert_eq!(info2.branch_index, 0);
    assert_eq!(info3.branch_index, 1);
    assert!(info2.has_siblings);

    assert_eq!(controller.active_thread().await, vec![n1, n3]);
    // the earlier answer is untouched
    assert!(controller.node(n2).await.unwrap().children_ids().is_empty());
}

#[tokio::test]
async fn switch_branch_then_follow_up_branches_from_selected_answer() {
    let controller = controller_with(ScriptedGenerator::new());
    let first = controller.add_message("Hi").await.unwrap();
    let (n1, n2) = (first.prompt_node_id, first.response_node_id);
    controller.regenerate_response(n1).await.unwrap();

    let thread = controller.switch_branch(n2).await.unwrap();
    assert_eq!(thread, vec![n1, n2]);
    assert_eq!(controller.active_thread().await, vec![n1, n2]);

    let follow = controller.add_message("follow up").await.unwrap();
    let (n4, n5) = (follow.prompt_node_id, follow.response_node_id);

    assert_eq!(controller.node(n4).await.unwrap().parent_id(), Some(n2));
    assert_eq!(controller.node(n5).await.unwrap().parent_id(), Some(n4));
    assert_eq!(controller.active_thread().await, vec![n1, n2, n4, n5]);

    assert_children_consistent(&controller).await;
}

#[tokio::test]
async fn switch_branch_matches_path_to_root() {
    let controller = controller_with(ScriptedGenerator::new());
    let first = controller.add_message("one").await.unwrap();
    controller.add_message("two").await.unwrap();
    controller
        .regenerate_response(first.prompt_node_id)
        .await
        .unwrap();

    for node in controller.snapshot().await.nodes {
        let thread = controller.switch_branch(node.id()).await.unwrap();
        assert_eq!(controller.active_thread().await, thread);
        assert_eq!(controller.path_to_root(node.id()).await.unwrap(), thread);
    }
}

#[tokio::test]
async fn switching_to_a_mid_thread_node_truncates_the_view() {
    let controller = controller_with(ScriptedGenerator::new());
    let first = controller.add_message("one").await.unwrap();
    let second = controller.add_message("two").await.unwrap();

    controller
        .switch_branch(first.response_node_id)
        .await
        .unwrap();
    assert_eq!(
        controller.active_thread().await,
        vec![first.prompt_node_id, first.response_node_id]
    );

    // Continuing creates a sibling of the earlier follow-up.
    let third = controller.add_message("two, differently").await.unwrap();
    let info = controller.branch_info(third.prompt_node_id).await.unwrap();
    assert_eq!(info.sibling_ids, vec![second.prompt_node_id, third.prompt_node_id]);
}

#[tokio::test]
async fn failed_generation_keeps_user_node_and_can_be_retried() {
    let generator = ScriptedGenerator::with_outcomes([Err(GenerationError::Provider(
        "rate limited".to_string(),
    ))]);
    let controller = controller_with(generator);

    let err = controller.add_message("x").await.unwrap_err();
    let user = err.prompt_node_id().expect("failure keeps the user node");
    assert!(matches!(
        err,
        ConversationError::GenerationFailure { ref source, .. }
            if *source == GenerationError::Provider("rate limited".to_string())
    ));
    assert!(!err.is_structural());

    assert_eq!(controller.node_count().await, 1);
    assert!(controller.node(user).await.unwrap().children_ids().is_empty());
    assert_eq!(controller.active_thread().await, vec![user]);

    let retry = controller.regenerate_response(user).await.unwrap();
    assert_eq!(retry.prompt_node_id, user);
    assert_eq!(
        controller.active_thread().await,
        vec![user, retry.response_node_id]
    );
}

#[tokio::test]
async fn regenerate_rejects_assistant_nodes() {
    let controller = controller_with(ScriptedGenerator::new());
    let outcome = controller.add_message("Hi").await.unwrap();

    let err = controller
        .regenerate_response(outcome.response_node_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ConversationError::NotAUserNode(id) if id == outcome.response_node_id));
    assert!(err.is_structural());
    assert_eq!(controller.node_count().await, 2);
}

#[tokio::test]
async fn switch_branch_to_unknown_node_fails() {
    let other = controller_with(ScriptedGenerator::new());
    let foreign = other.add_message("elsewhere").await.unwrap().prompt_node_id;

    let controller = controller_with(ScriptedGenerator::new());
    let err = controller.switch_branch(foreign).await.unwrap_err();
    assert!(matches!(
        err,
        ConversationError::Tree(TreeError::NodeNotFound(id)) if id == foreign
    ));
}

#[tokio::test]
async fn generator_receives_full_history_with_models() {
    let generator = ScriptedGenerator::with_outcomes([Ok(GeneratedResponse::new(
        "Hello!", "model-x",
    ))]);
    let controller = controller_with(generator.clone());

    controller.add_message("Hi").await.unwrap();
    controller.add_message("How are you?").await.unwrap();

    let calls = generator.calls();
    let last = calls.last().unwrap();
    let roles: Vec<Role> = last.iter().map(|turn| turn.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    assert_eq!(last[1].model.as_deref(), Some("model-x"));
    assert_eq!(last[2].text, "How are you?");
}

#[tokio::test]
async fn edit_and_resend_creates_sibling_prompt() {
    let controller = controller_with(ScriptedGenerator::new());
    let first = controller.add_message("Hi").await.unwrap();
    let follow = controller.add_message("Tell me a joke").await.unwrap();

    let edited = controller
        .edit_and_resend(follow.prompt_node_id, "Tell me a pun")
        .await
        .unwrap();

    let info = controller.branch_info(edited.prompt_node_id).await.unwrap();
    assert_eq!(
        info.sibling_ids,
        vec![follow.prompt_node_id, edited.prompt_node_id]
    );
    assert_eq!(
        controller.active_thread().await,
        vec![
            first.prompt_node_id,
            first.response_node_id,
            edited.prompt_node_id,
            edited.response_node_id
        ]
    );
    assert_eq!(
        controller.node(edited.response_node_id).await.unwrap().text(),
        "echo: Tell me a pun"
    );
}

#[tokio::test]
async fn editing_a_root_prompt_starts_a_parallel_root() {
    let controller = controller_with(ScriptedGenerator::new());
    let first = controller.add_message("Hi").await.unwrap();

    let edited = controller
        .edit_and_resend(first.prompt_node_id, "Hello")
        .await
        .unwrap();

    let node = controller.node(edited.prompt_node_id).await.unwrap();
    assert!(node.is_root());
    assert_eq!(
        controller.active_thread().await,
        vec![edited.prompt_node_id, edited.response_node_id]
    );
}

#[tokio::test]
async fn edit_and_resend_rejects_assistant_targets() {
    let controller = controller_with(ScriptedGenerator::new());
    let first = controller.add_message("Hi").await.unwrap();

    let err = controller
        .edit_and_resend(first.response_node_id, "x")
        .await
        .unwrap_err();
    assert!(matches!(err, ConversationError::NotAUserNode(id) if id == first.response_node_id));
    assert!(err.is_structural());
    assert_eq!(controller.node_count().await, 2);
    assert_eq!(
        controller.active_thread().await,
        vec![first.prompt_node_id, first.response_node_id]
    );
}

#[tokio::test]
async fn edit_and_resend_rejects_blank_text() {
    let controller = controller_with(ScriptedGenerator::new());
    let first = controller.add_message("Hi").await.unwrap();

    let err = controller
        .edit_and_resend(first.prompt_node_id, "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, ConversationError::EmptyMessage));
    assert_eq!(controller.node_count().await, 2);
}

#[tokio::test]
async fn switch_to_sibling_moves_between_answers() {
    let controller = controller_with(ScriptedGenerator::new());
    let first = controller.add_message("Hi").await.unwrap();
    let second = controller
        .regenerate_response(first.prompt_node_id)
        .await
        .unwrap();

    let thread = controller
        .switch_to_sibling(second.response_node_id, 0)
        .await
        .unwrap();
    assert_eq!(thread, vec![first.prompt_node_id, first.response_node_id]);

    let err = controller
        .switch_to_sibling(second.response_node_id, 5)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConversationError::Tree(TreeError::BranchOutOfRange { index: 5, count: 2, .. })
    ));
    // a failed switch leaves the thread alone
    assert_eq!(
        controller.active_thread().await,
        vec![first.prompt_node_id, first.response_node_id]
    );
}

#[tokio::test]
async fn new_conversation_adds_a_second_root_to_the_same_store() {
    let controller = controller_with(ScriptedGenerator::new());
    let first = controller.add_message("chat one").await.unwrap();

    controller.start_new_conversation().await;
    assert!(controller.active_thread().await.is_empty());

    let second = controller.add_message("chat two").await.unwrap();
    assert!(controller
        .node(second.prompt_node_id)
        .await
        .unwrap()
        .is_root());
    assert_eq!(controller.node_count().await, 4);

    // the first chat is still reachable
    controller
        .switch_branch(first.response_node_id)
        .await
        .unwrap();
    assert_eq!(
        controller.active_thread().await,
        vec![first.prompt_node_id, first.response_node_id]
    );
}

#[tokio::test]
async fn many_operations_keep_children_consistent() {
    let controller = controller_with(ScriptedGenerator::new());
    let root = controller.add_message("start").await.unwrap();
    for i in 0..3 {
        controller.add_message(format!("turn {i}")).await.unwrap();
        controller
            .regenerate_response(root.prompt_node_id)
            .await
            .unwrap();
        controller
            .switch_branch(root.response_node_id)
            .await
            .unwrap();
    }

    assert_children_consistent(&controller).await;
    for node in controller.snapshot().await.nodes {
        let info = controller.branch_info(node.id()).await.unwrap();
        assert!(info.branch_index < info.sibling_count);
        let path = controller.path_to_root(node.id()).await.unwrap();
        assert!(controller.node(path[0]).await.unwrap().is_root());
        assert_eq!(*path.last().unwrap(), node.id());
    }
}
