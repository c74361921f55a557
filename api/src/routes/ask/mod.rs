pub mod ask_question_route;
